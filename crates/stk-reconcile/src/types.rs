use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stk_store::{Platform, StockKey, StockRecordPatch};

/// key -> signed quantity change to apply to one platform.
pub type DeltaMap = BTreeMap<StockKey, i64>;

/// Per-run reconciler output.
///
/// Each map holds adjustments to apply TO that platform: a sale observed on
/// the primary side shows up in `marketplace`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationDelta {
    pub primary: DeltaMap,
    pub marketplace: DeltaMap,
}

impl ReconciliationDelta {
    pub fn primary_has_changes(&self) -> bool {
        !self.primary.is_empty()
    }

    pub fn marketplace_has_changes(&self) -> bool {
        !self.marketplace.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.marketplace.is_empty()
    }

    pub fn for_platform(&self, target: Platform) -> &DeltaMap {
        match target {
            Platform::Primary => &self.primary,
            Platform::Marketplace => &self.marketplace,
        }
    }

    pub fn insert(&mut self, target: Platform, key: StockKey, delta: i64) {
        match target {
            Platform::Primary => self.primary.insert(key, delta),
            Platform::Marketplace => self.marketplace.insert(key, delta),
        };
    }

    pub fn remove_key(&mut self, key: &StockKey) {
        self.primary.remove(key);
        self.marketplace.remove(key);
    }
}

/// Deltas derived for a single key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyDeltas {
    /// Change observed on the marketplace, to be applied to the primary.
    pub to_primary: Option<i64>,
    /// Change observed on the primary, to be applied to the marketplace.
    pub to_marketplace: Option<i64>,
}

impl KeyDeltas {
    pub fn for_platform(&self, target: Platform) -> Option<i64> {
        match target {
            Platform::Primary => self.to_primary,
            Platform::Marketplace => self.to_marketplace,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_primary.is_none() && self.to_marketplace.is_none()
    }
}

/// Which sides of a key were observed in the current run's snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observed {
    pub primary: bool,
    pub marketplace: bool,
}

impl Observed {
    pub fn side(&self, p: Platform) -> bool {
        match p {
            Platform::Primary => self.primary,
            Platform::Marketplace => self.marketplace,
        }
    }
}

/// Keys seen per platform during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedKeys {
    pub primary: BTreeSet<StockKey>,
    pub marketplace: BTreeSet<StockKey>,
}

impl ObservedKeys {
    pub fn mark(&mut self, p: Platform, key: StockKey) {
        match p {
            Platform::Primary => self.primary.insert(key),
            Platform::Marketplace => self.marketplace.insert(key),
        };
    }

    pub fn of(&self, key: &StockKey) -> Observed {
        Observed {
            primary: self.primary.contains(key),
            marketplace: self.marketplace.contains(key),
        }
    }

    pub fn all_keys(&self) -> BTreeSet<StockKey> {
        self.primary.union(&self.marketplace).cloned().collect()
    }
}

/// Result of reconciling one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOutcome {
    pub deltas: KeyDeltas,
    /// A side was seeded this run; nothing is propagated for the key.
    pub is_new_key: bool,
    pub override_applied: bool,
    /// Baseline changes to persist for the key.
    pub patch: StockRecordPatch,
}

/// Operator overrides loaded before the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    /// key -> forced absolute quantity.
    pub quantities: BTreeMap<StockKey, i64>,
    /// marketplace product id -> sku it must be bound to.
    pub links: BTreeMap<i64, String>,
}

impl OverrideSet {
    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty() && self.links.is_empty()
    }
}

/// Forced quantities per target platform, built by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverridePlan {
    pub primary: BTreeMap<StockKey, i64>,
    pub marketplace: BTreeMap<StockKey, i64>,
}

impl OverridePlan {
    pub fn for_platform(&self, target: Platform) -> &BTreeMap<StockKey, i64> {
        match target {
            Platform::Primary => &self.primary,
            Platform::Marketplace => &self.marketplace,
        }
    }

    pub fn insert(&mut self, target: Platform, key: StockKey, quantity: i64) {
        match target {
            Platform::Primary => self.primary.insert(key, quantity),
            Platform::Marketplace => self.marketplace.insert(key, quantity),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.marketplace.is_empty()
    }
}
