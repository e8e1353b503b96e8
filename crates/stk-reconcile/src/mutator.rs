//! Write-back of deltas and forced quantities to one platform.
//!
//! Best effort: one item's failed write is logged and the batch continues.
//! After every attempted write, successful or not, the target side's
//! baseline is set to the attempted quantity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use stk_store::{Platform, StockKey, StockRecord, StockRecordPatch, StockRecordStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::DeltaMap;

/// One absolute quantity to set on the writer's platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWrite {
    pub key: StockKey,
    pub quantity: i64,
    /// Override-driven rather than delta-driven.
    pub forced: bool,
    pub record: StockRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The record lacks the identifiers the platform needs.
    #[error("cannot address item on platform: {0}")]
    Unaddressable(String),
    #[error("platform rejected write: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Platform write-back seam. Results are positional with `writes`.
#[async_trait]
pub trait StockWriter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn write(&self, writes: &[StockWrite]) -> Vec<Result<(), WriteError>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub attempted: u64,
    pub applied: u64,
    pub failed: u64,
    pub forced: u64,
    /// Keys whose record could not be loaded; nothing was written for them.
    pub skipped: u64,
    /// Baselines that could not be persisted after a write.
    pub baseline_errors: u64,
}

impl ApplySummary {
    /// Writes were attempted and none landed.
    pub fn is_systemic_failure(&self) -> bool {
        self.attempted > 0 && self.applied == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {} writes to {platform} failed", .failures.len(), .summary.attempted)]
pub struct PartialFailure {
    pub platform: Platform,
    pub summary: ApplySummary,
    pub failures: Vec<(StockKey, String)>,
}

/// Quantity after propagating `delta` onto `current`; never negative.
pub fn propagated_quantity(current: i64, delta: i64) -> i64 {
    current.saturating_add(delta).max(0)
}

pub struct StockMutator<'a, S: StockRecordStore + ?Sized> {
    store: &'a S,
    shop: &'a str,
}

impl<'a, S: StockRecordStore + ?Sized> StockMutator<'a, S> {
    pub fn new(store: &'a S, shop: &'a str) -> Self {
        Self { store, shop }
    }

    /// Apply `deltas` (and then any uncovered `overrides`) through `writer`.
    ///
    /// An override for a key also present in `deltas` wins; each key is
    /// written at most once.
    pub async fn apply_deltas<W: StockWriter + ?Sized>(
        &self,
        writer: &W,
        deltas: &DeltaMap,
        overrides: &BTreeMap<StockKey, i64>,
    ) -> Result<ApplySummary, PartialFailure> {
        let platform = writer.platform();
        let mut summary = ApplySummary::default();
        let mut writes: Vec<StockWrite> = Vec::new();

        for (key, delta) in deltas {
            let Some(record) = self.load(key, &mut summary).await else {
                continue;
            };
            let (quantity, forced) = match overrides.get(key) {
                Some(v) => ((*v).max(0), true),
                None => (propagated_quantity(record.levels(platform).current, *delta), false),
            };
            writes.push(StockWrite {
                key: key.clone(),
                quantity,
                forced,
                record,
            });
        }

        for (key, value) in overrides {
            if deltas.contains_key(key) {
                continue;
            }
            let Some(record) = self.load(key, &mut summary).await else {
                continue;
            };
            writes.push(StockWrite {
                key: key.clone(),
                quantity: (*value).max(0),
                forced: true,
                record,
            });
        }

        if writes.is_empty() {
            return Ok(summary);
        }

        let results = writer.write(&writes).await;
        let mut failures: Vec<(StockKey, String)> = Vec::new();

        for (i, w) in writes.iter().enumerate() {
            summary.attempted += 1;
            if w.forced {
                summary.forced += 1;
            }

            let outcome = results.get(i).cloned().unwrap_or_else(|| {
                Err(WriteError::Rejected("writer returned no result".to_string()))
            });

            let mut patch = StockRecordPatch::default();
            patch.set_levels(
                platform,
                stk_store::StockLevels {
                    current: w.quantity,
                    previous: w.quantity,
                    initialized: true,
                },
            );

            match outcome {
                Ok(()) => {
                    summary.applied += 1;
                    if w.forced {
                        patch.override_requested = Some(false);
                    }
                    info!(shop = self.shop, key = %w.key, platform = %platform, quantity = w.quantity, forced = w.forced, "stock written");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(shop = self.shop, key = %w.key, platform = %platform, quantity = w.quantity, error = %e, "stock write failed; continuing");
                    failures.push((w.key.clone(), e.to_string()));
                }
            }

            if let Err(e) = self.store.upsert_merge(self.shop, &w.key, &patch).await {
                summary.baseline_errors += 1;
                warn!(shop = self.shop, key = %w.key, error = %e, "baseline save after write failed");
            }
        }

        info!(
            shop = self.shop,
            platform = %platform,
            attempted = summary.attempted,
            applied = summary.applied,
            failed = summary.failed,
            forced = summary.forced,
            "apply complete"
        );

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(PartialFailure {
                platform,
                summary,
                failures,
            })
        }
    }

    async fn load(&self, key: &StockKey, summary: &mut ApplySummary) -> Option<StockRecord> {
        match self.store.get(self.shop, key).await {
            Ok(Some(r)) => Some(r),
            Ok(None) => {
                warn!(shop = self.shop, %key, "no stock record to apply; skipping");
                summary.skipped += 1;
                None
            }
            Err(e) => {
                warn!(shop = self.shop, %key, error = %e, "stock record load failed; skipping");
                summary.skipped += 1;
                None
            }
        }
    }
}
