//! Operator instructions read from the store before a run.

use stk_store::{RecordFlag, StockRecordStore, StoreResult};
use tracing::{info, warn};

use crate::OverrideSet;

pub struct OverrideResolver<'a, S: StockRecordStore + ?Sized> {
    store: &'a S,
    shop: &'a str,
}

impl<'a, S: StockRecordStore + ?Sized> OverrideResolver<'a, S> {
    pub fn new(store: &'a S, shop: &'a str) -> Self {
        Self { store, shop }
    }

    /// Forced quantities and SKU links currently requested for the shop.
    ///
    /// Incomplete instructions are skipped with a warning; negative forced
    /// quantities are clamped to zero.
    pub async fn load(&self) -> StoreResult<OverrideSet> {
        let mut set = OverrideSet::default();

        for rec in self
            .store
            .get_all_where(self.shop, RecordFlag::OverrideRequested)
            .await?
        {
            match rec.override_value {
                Some(v) if v < 0 => {
                    warn!(key = %rec.key, value = v, "negative override clamped to zero");
                    set.quantities.insert(rec.key, 0);
                }
                Some(v) => {
                    set.quantities.insert(rec.key, v);
                }
                None => warn!(key = %rec.key, "override requested without a value; ignored"),
            }
        }

        for rec in self
            .store
            .get_all_where(self.shop, RecordFlag::LinkSkuRequested)
            .await?
        {
            match (rec.marketplace_product_id, rec.sku.as_deref()) {
                (Some(pid), Some(sku)) if !sku.trim().is_empty() => {
                    if let Some(prev) = set.links.insert(pid, sku.to_string()) {
                        warn!(product_id = pid, previous = %prev, sku, "duplicate sku link; last one wins");
                    }
                }
                _ => warn!(key = %rec.key, "sku link requested without product id and sku; ignored"),
            }
        }

        info!(
            shop = self.shop,
            quantities = set.quantities.len(),
            links = set.links.len(),
            "overrides loaded"
        );
        Ok(set)
    }
}
