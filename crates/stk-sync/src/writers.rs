//! Platform adapters for [`StockWriter`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use stk_marketplace::{ListingInventory, MarketplaceApi, MarketplaceError};
use stk_primary::{LevelWrite, PrimaryApi, PrimaryError};
use stk_reconcile::{Platform, StockWrite, StockWriter, WriteError};
use tracing::{debug, warn};

use crate::ListingCache;

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

/// One absolute-quantity call per item and location.
pub struct PrimaryWriter<'a> {
    api: &'a dyn PrimaryApi,
}

impl<'a> PrimaryWriter<'a> {
    pub fn new(api: &'a dyn PrimaryApi) -> Self {
        Self { api }
    }

    fn level_write(w: &StockWrite) -> Result<LevelWrite, WriteError> {
        let location_id = w
            .record
            .location_id
            .clone()
            .ok_or_else(|| WriteError::Unaddressable(format!("{} has no primary location", w.key)))?;
        let inventory_item_id = w
            .record
            .inventory_item_id
            .clone()
            .ok_or_else(|| WriteError::Unaddressable(format!("{} has no primary inventory item", w.key)))?;
        Ok(LevelWrite {
            location_id,
            inventory_item_id,
            available: w.quantity,
        })
    }
}

fn primary_write_error(e: PrimaryError) -> WriteError {
    match e {
        PrimaryError::Transport(m) => WriteError::Transport(m),
        other => WriteError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl StockWriter for PrimaryWriter<'_> {
    fn platform(&self) -> Platform {
        Platform::Primary
    }

    async fn write(&self, writes: &[StockWrite]) -> Vec<Result<(), WriteError>> {
        let mut out = Vec::with_capacity(writes.len());
        for w in writes {
            let res = match Self::level_write(w) {
                Ok(level) => self.api.set_available(&level).await.map_err(primary_write_error),
                Err(e) => Err(e),
            };
            out.push(res);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

/// Full-listing inventory writes, one call per listing.
///
/// Writes are grouped by listing; products of the listing that are not being
/// changed keep their current quantity. Pending SKU links ride along with
/// the write of their listing.
pub struct MarketplaceWriter<'a> {
    api: &'a dyn MarketplaceApi,
    access_token: &'a str,
    links: &'a BTreeMap<i64, String>,
    cache: Mutex<ListingCache>,
    written: Mutex<BTreeSet<i64>>,
}

fn marketplace_write_error(e: MarketplaceError) -> WriteError {
    match e {
        MarketplaceError::Transport(m) => WriteError::Transport(m),
        other => WriteError::Rejected(other.to_string()),
    }
}

impl<'a> MarketplaceWriter<'a> {
    pub fn new(
        api: &'a dyn MarketplaceApi,
        access_token: &'a str,
        links: &'a BTreeMap<i64, String>,
        cache: ListingCache,
    ) -> Self {
        Self {
            api,
            access_token,
            links,
            cache: Mutex::new(cache),
            written: Mutex::new(BTreeSet::new()),
        }
    }

    fn cached(&self, listing_id: i64) -> Option<ListingInventory> {
        match self.cache.lock() {
            Ok(g) => g.get(&listing_id).cloned(),
            Err(_) => None,
        }
    }

    fn mark_written(&self, listing_id: i64) {
        if let Ok(mut g) = self.written.lock() {
            g.insert(listing_id);
        }
    }

    fn was_written(&self, listing_id: i64) -> bool {
        self.written
            .lock()
            .map(|g| g.contains(&listing_id))
            .unwrap_or(false)
    }

    /// Listing inventory from the pass cache, read again if absent.
    async fn inventory(&self, listing_id: i64) -> Result<ListingInventory, MarketplaceError> {
        if let Some(inv) = self.cached(listing_id) {
            return Ok(inv);
        }
        let inv = self.api.listing_inventory(self.access_token, listing_id).await?;
        if let Ok(mut g) = self.cache.lock() {
            g.insert(listing_id, inv.clone());
        }
        Ok(inv)
    }

    fn links_for(&self, inventory: &ListingInventory) -> BTreeMap<i64, String> {
        inventory
            .products
            .iter()
            .filter_map(|p| self.links.get(&p.product_id).map(|s| (p.product_id, s.clone())))
            .collect()
    }

    /// Write one listing; `items` are `(position, product_id, quantity)`.
    async fn write_listing(
        &self,
        listing_id: i64,
        items: &[(usize, i64, i64)],
        results: &mut [Option<Result<(), WriteError>>],
    ) {
        let inventory = match self.inventory(listing_id).await {
            Ok(inv) => inv,
            Err(e) => {
                let err = marketplace_write_error(e);
                for (pos, _, _) in items {
                    results[*pos] = Some(Err(err.clone()));
                }
                return;
            }
        };

        let mut quantities = BTreeMap::new();
        let mut included = Vec::new();
        for (pos, product_id, quantity) in items {
            match inventory.product(*product_id) {
                Some(p) if p.is_syncable() => {
                    quantities.insert(*product_id, *quantity);
                    included.push(*pos);
                }
                _ => {
                    results[*pos] = Some(Err(WriteError::Unaddressable(format!(
                        "product {product_id} not writable in listing {listing_id}"
                    ))));
                }
            }
        }
        if included.is_empty() {
            return;
        }

        let update = inventory.to_update(&quantities, &self.links_for(&inventory));
        let outcome = self
            .api
            .update_listing_inventory(self.access_token, listing_id, &update)
            .await
            .map_err(marketplace_write_error);
        if outcome.is_ok() {
            self.mark_written(listing_id);
        }
        debug!(listing_id, products = included.len(), ok = outcome.is_ok(), "listing inventory written");
        for pos in included {
            results[pos] = Some(outcome.clone());
        }
    }

    /// Push pending SKU links for cached listings not already written.
    ///
    /// Returns the number of listings written and the failures.
    pub async fn write_pending_links(&self) -> (u64, Vec<(i64, WriteError)>) {
        if self.links.is_empty() {
            return (0, Vec::new());
        }

        let pending: Vec<(i64, ListingInventory)> = match self.cache.lock() {
            Ok(g) => g
                .iter()
                .filter(|(_, inv)| {
                    inv.products
                        .iter()
                        .any(|p| p.is_syncable() && self.links.contains_key(&p.product_id))
                })
                .map(|(id, inv)| (*id, inv.clone()))
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut written = 0;
        let mut failures = Vec::new();
        for (listing_id, inventory) in pending {
            if self.was_written(listing_id) {
                continue;
            }
            let update = inventory.to_update(&BTreeMap::new(), &self.links_for(&inventory));
            match self
                .api
                .update_listing_inventory(self.access_token, listing_id, &update)
                .await
            {
                Ok(()) => {
                    self.mark_written(listing_id);
                    written += 1;
                }
                Err(e) => {
                    warn!(listing_id, error = %e, "sku link write failed");
                    failures.push((listing_id, marketplace_write_error(e)));
                }
            }
        }
        (written, failures)
    }
}

#[async_trait]
impl StockWriter for MarketplaceWriter<'_> {
    fn platform(&self) -> Platform {
        Platform::Marketplace
    }

    async fn write(&self, writes: &[StockWrite]) -> Vec<Result<(), WriteError>> {
        let mut results: Vec<Option<Result<(), WriteError>>> = vec![None; writes.len()];
        let mut by_listing: BTreeMap<i64, Vec<(usize, i64, i64)>> = BTreeMap::new();

        for (pos, w) in writes.iter().enumerate() {
            match (w.record.marketplace_listing_id, w.record.marketplace_product_id) {
                (Some(listing_id), Some(product_id)) => {
                    by_listing
                        .entry(listing_id)
                        .or_default()
                        .push((pos, product_id, w.quantity));
                }
                _ => {
                    results[pos] = Some(Err(WriteError::Unaddressable(format!(
                        "{} has no marketplace listing",
                        w.key
                    ))));
                }
            }
        }

        for (listing_id, items) in &by_listing {
            self.write_listing(*listing_id, items, &mut results).await;
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(WriteError::Rejected("write not attempted".to_string()))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stk_store::{StockKey, StockRecord};

    fn write_for(record: StockRecord, quantity: i64) -> StockWrite {
        StockWrite {
            key: record.key.clone(),
            quantity,
            forced: false,
            record,
        }
    }

    #[test]
    fn level_write_needs_location_and_item() {
        let mut rec = StockRecord::new(StockKey::new("gid://shopify/InventoryItem/1"));
        let err = PrimaryWriter::level_write(&write_for(rec.clone(), 3)).unwrap_err();
        assert!(matches!(err, WriteError::Unaddressable(_)));

        rec.location_id = Some("gid://shopify/Location/9".to_string());
        rec.inventory_item_id = Some("gid://shopify/InventoryItem/1".to_string());
        let level = PrimaryWriter::level_write(&write_for(rec, 3)).unwrap();
        assert_eq!(level.available, 3);
        assert_eq!(level.location_id, "gid://shopify/Location/9");
    }

    #[test]
    fn transport_failures_stay_transport() {
        assert_eq!(
            marketplace_write_error(MarketplaceError::Transport("reset".to_string())),
            WriteError::Transport("reset".to_string())
        );
        assert!(matches!(
            primary_write_error(PrimaryError::Api {
                status: 422,
                body: "invalid".to_string()
            }),
            WriteError::Rejected(_)
        ));
    }
}
