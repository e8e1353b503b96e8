//! Stock record model.
//!
//! One [`StockRecord`] exists per stocked unit and carries the last two
//! observed quantities for each platform plus the descriptive attributes
//! whichever snapshot last supplied them. Updates are always expressed as a
//! [`StockRecordPatch`]: a `None` field is never written, so a partial
//! snapshot cannot clobber attributes it does not carry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Stable identifier of a stock record.
///
/// For items known to the primary platform this is the inventory item id
/// (shared by inventory-level and variant-descriptor export lines). Items
/// only ever seen on the marketplace are keyed `marketplace:<product_id>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockKey(String);

impl StockKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a marketplace product that has no primary counterpart yet.
    pub fn marketplace(product_id: i64) -> Self {
        Self(format!("marketplace:{product_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StockKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Per-platform quantities
// ---------------------------------------------------------------------------

/// Last two observed quantities for one platform.
///
/// `previous` is the reconciled baseline. `initialized` becomes `true` the
/// first time the baseline is seeded from an observation; until then no delta
/// may be derived from this side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub current: i64,
    pub previous: i64,
    pub initialized: bool,
}

impl StockLevels {
    pub fn seeded(quantity: i64) -> Self {
        Self {
            current: quantity,
            previous: quantity,
            initialized: true,
        }
    }

    /// Signed change since the baseline, if the side is initialized and moved.
    pub fn change(&self) -> Option<i64> {
        if self.initialized && self.current != self.previous {
            Some(self.current - self.previous)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub key: StockKey,

    #[serde(default)]
    pub primary: StockLevels,
    #[serde(default)]
    pub marketplace: StockLevels,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_listing_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_variation: Option<String>,

    /// Operator asked for the quantity to be forced to `override_value`.
    #[serde(default)]
    pub override_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_value: Option<i64>,
    /// Operator asked for `marketplace_product_id` to be bound to `sku`.
    #[serde(default)]
    pub link_sku_requested: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockRecord {
    pub fn new(key: StockKey) -> Self {
        Self {
            key,
            primary: StockLevels::default(),
            marketplace: StockLevels::default(),
            sku: None,
            inventory_item_id: None,
            location_id: None,
            parent_id: None,
            parent_title: None,
            variant_id: None,
            variant_name: None,
            marketplace_product_id: None,
            marketplace_listing_id: None,
            marketplace_title: None,
            marketplace_variation: None,
            override_requested: false,
            override_value: None,
            link_sku_requested: false,
            updated_at: None,
        }
    }

    /// Merge `patch` into this record. The key never changes.
    pub fn merge(&mut self, patch: &StockRecordPatch, now: DateTime<Utc>) {
        fn set<T: Clone>(dst: &mut T, src: &Option<T>) {
            if let Some(v) = src {
                *dst = v.clone();
            }
        }
        fn set_opt<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }

        set(&mut self.primary.current, &patch.primary_current.map(|q| q.max(0)));
        set(&mut self.primary.previous, &patch.primary_previous.map(|q| q.max(0)));
        set(&mut self.primary.initialized, &patch.primary_initialized);
        set(
            &mut self.marketplace.current,
            &patch.marketplace_current.map(|q| q.max(0)),
        );
        set(
            &mut self.marketplace.previous,
            &patch.marketplace_previous.map(|q| q.max(0)),
        );
        set(&mut self.marketplace.initialized, &patch.marketplace_initialized);

        set_opt(&mut self.sku, &patch.sku);
        set_opt(&mut self.inventory_item_id, &patch.inventory_item_id);
        set_opt(&mut self.location_id, &patch.location_id);
        set_opt(&mut self.parent_id, &patch.parent_id);
        set_opt(&mut self.parent_title, &patch.parent_title);
        set_opt(&mut self.variant_id, &patch.variant_id);
        set_opt(&mut self.variant_name, &patch.variant_name);
        set_opt(&mut self.marketplace_product_id, &patch.marketplace_product_id);
        set_opt(&mut self.marketplace_listing_id, &patch.marketplace_listing_id);
        set_opt(&mut self.marketplace_title, &patch.marketplace_title);
        set_opt(&mut self.marketplace_variation, &patch.marketplace_variation);

        set(&mut self.override_requested, &patch.override_requested);
        set_opt(&mut self.override_value, &patch.override_value);
        set(&mut self.link_sku_requested, &patch.link_sku_requested);

        self.updated_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Partial update of a [`StockRecord`]. Only `Some` fields are written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecordPatch {
    pub primary_current: Option<i64>,
    pub primary_previous: Option<i64>,
    pub primary_initialized: Option<bool>,
    pub marketplace_current: Option<i64>,
    pub marketplace_previous: Option<i64>,
    pub marketplace_initialized: Option<bool>,

    pub sku: Option<String>,
    pub inventory_item_id: Option<String>,
    pub location_id: Option<String>,
    pub parent_id: Option<String>,
    pub parent_title: Option<String>,
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,

    pub marketplace_product_id: Option<i64>,
    pub marketplace_listing_id: Option<i64>,
    pub marketplace_title: Option<String>,
    pub marketplace_variation: Option<String>,

    pub override_requested: Option<bool>,
    pub override_value: Option<i64>,
    pub link_sku_requested: Option<bool>,
}

impl StockRecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch that records `quantity` as both current and baseline for `platform`.
    pub fn baseline(platform: Platform, quantity: i64) -> Self {
        let mut p = Self::default();
        p.set_levels(platform, StockLevels::seeded(quantity));
        p
    }

    pub fn set_levels(&mut self, platform: Platform, levels: StockLevels) {
        match platform {
            Platform::Primary => {
                self.primary_current = Some(levels.current);
                self.primary_previous = Some(levels.previous);
                self.primary_initialized = Some(levels.initialized);
            }
            Platform::Marketplace => {
                self.marketplace_current = Some(levels.current);
                self.marketplace_previous = Some(levels.previous);
                self.marketplace_initialized = Some(levels.initialized);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The two inventories being kept in step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Platform A: the primary shop, read through bulk exports.
    Primary,
    /// Platform B: the marketplace, read through listing/inventory calls.
    Marketplace,
}

impl Platform {
    pub fn opposite(self) -> Self {
        match self {
            Platform::Primary => Platform::Marketplace,
            Platform::Marketplace => Platform::Primary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Primary => "primary",
            Platform::Marketplace => "marketplace",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StockRecord {
    pub fn levels(&self, platform: Platform) -> &StockLevels {
        match platform {
            Platform::Primary => &self.primary,
            Platform::Marketplace => &self.marketplace,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn merge_leaves_absent_fields_untouched() {
        let mut rec = StockRecord::new(StockKey::new("gid://shopify/InventoryItem/1"));
        rec.merge(
            &StockRecordPatch {
                sku: Some("MUG-RED".to_string()),
                parent_title: Some("Mug".to_string()),
                primary_current: Some(8),
                ..Default::default()
            },
            now(),
        );
        rec.merge(
            &StockRecordPatch {
                location_id: Some("gid://shopify/Location/9".to_string()),
                primary_current: Some(7),
                ..Default::default()
            },
            now(),
        );

        assert_eq!(rec.sku.as_deref(), Some("MUG-RED"));
        assert_eq!(rec.parent_title.as_deref(), Some("Mug"));
        assert_eq!(rec.location_id.as_deref(), Some("gid://shopify/Location/9"));
        assert_eq!(rec.primary.current, 7);
        assert_eq!(rec.key.as_str(), "gid://shopify/InventoryItem/1");
    }

    #[test]
    fn merge_clamps_negative_quantities() {
        let mut rec = StockRecord::new(StockKey::new("k"));
        rec.merge(
            &StockRecordPatch {
                primary_current: Some(-4),
                marketplace_current: Some(-1),
                ..Default::default()
            },
            now(),
        );
        assert_eq!(rec.primary.current, 0);
        assert_eq!(rec.marketplace.current, 0);
    }

    #[test]
    fn change_requires_initialized_side() {
        let uninit = StockLevels {
            current: 5,
            previous: 0,
            initialized: false,
        };
        assert_eq!(uninit.change(), None);

        let moved = StockLevels {
            current: 7,
            previous: 10,
            initialized: true,
        };
        assert_eq!(moved.change(), Some(-3));
        assert_eq!(StockLevels::seeded(4).change(), None);
    }

    #[test]
    fn record_document_roundtrips_through_json() {
        let mut rec = StockRecord::new(StockKey::marketplace(42));
        rec.marketplace_product_id = Some(42);
        rec.marketplace = StockLevels::seeded(3);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["key"], "marketplace:42");
        let back: StockRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, rec);
    }
}
