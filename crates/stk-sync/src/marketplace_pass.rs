//! Marketplace snapshot: shop, listings, per-listing inventory.
//!
//! Each syncable product is bound to a stock record by SKU (the linked SKU
//! when an operator link names the product), or to its own
//! `marketplace:<product_id>` record when no SKU matches.

use std::collections::BTreeMap;

use serde::Serialize;
use stk_marketplace::{Listing, ListingInventory, ListingProduct, MarketplaceApi};
use stk_reconcile::{ObservedKeys, Platform};
use stk_store::{ShopRecord, ShopStore, StockKey, StockRecordPatch, StockRecordStore};
use tracing::{debug, info, warn};

use crate::{Stage, SyncContext, SyncError};

/// Listing inventories read during the pass, by listing id.
pub type ListingCache = BTreeMap<i64, ListingInventory>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketplacePassStats {
    pub shop_id: Option<i64>,
    pub listings: u64,
    /// Listings whose inventory could not be read.
    pub listings_skipped: u64,
    pub products: u64,
    /// Deleted products and products without offerings.
    pub products_skipped: u64,
    pub matched_by_sku: u64,
    pub linked: u64,
    pub store_errors: u64,
}

pub async fn ingest_marketplace(
    ctx: &SyncContext,
    shop: &ShopRecord,
    access_token: &str,
    links: &BTreeMap<i64, String>,
    observed: &mut ObservedKeys,
) -> Result<(MarketplacePassStats, ListingCache), SyncError> {
    let stage = Stage::MarketplaceListings;
    let domain = shop.shop_domain.as_str();
    let mut stats = MarketplacePassStats::default();
    let mut cache = ListingCache::new();

    let shop_id = match ctx.marketplace.user_shop(access_token).await {
        Ok(found) => {
            if let Err(e) = ctx
                .store
                .save_marketplace_shop(domain, found.shop_id, &found.shop_name)
                .await
            {
                warn!(shop = domain, error = %e, "marketplace shop save failed");
            }
            found.shop_id
        }
        Err(e) => match shop.marketplace_shop_id {
            Some(id) => {
                warn!(shop = domain, error = %e, shop_id = id, "marketplace shop lookup failed; using stored id");
                id
            }
            None => return Err(SyncError::new(stage, e)),
        },
    };
    stats.shop_id = Some(shop_id);

    let listings = ctx
        .marketplace
        .shop_listings(access_token, shop_id)
        .await
        .map_err(|e| SyncError::new(stage, e))?;

    for listing in &listings {
        stats.listings += 1;
        let inventory = match ctx
            .marketplace
            .listing_inventory(access_token, listing.listing_id)
            .await
        {
            Ok(inv) => inv,
            Err(e) => {
                stats.listings_skipped += 1;
                warn!(shop = domain, listing_id = listing.listing_id, error = %e, "listing inventory unreadable; skipping");
                continue;
            }
        };

        for product in &inventory.products {
            ingest_product(ctx, domain, listing, product, links, observed, &mut stats).await;
        }
        cache.insert(listing.listing_id, inventory);
    }

    info!(
        shop = domain,
        shop_id,
        listings = stats.listings,
        listings_skipped = stats.listings_skipped,
        products = stats.products,
        matched_by_sku = stats.matched_by_sku,
        linked = stats.linked,
        store_errors = stats.store_errors,
        "marketplace listings ingested"
    );
    Ok((stats, cache))
}

async fn ingest_product(
    ctx: &SyncContext,
    shop: &str,
    listing: &Listing,
    product: &ListingProduct,
    links: &BTreeMap<i64, String>,
    observed: &mut ObservedKeys,
    stats: &mut MarketplacePassStats,
) {
    let quantity = match product.quantity() {
        Some(q) if product.is_syncable() => q,
        _ => {
            stats.products_skipped += 1;
            return;
        }
    };
    stats.products += 1;

    let linked = links.get(&product.product_id);
    let sku = linked.map(String::as_str).or_else(|| product.sku());

    let key = match sku {
        Some(sku) => match ctx.store.find_by_sku(shop, sku).await {
            Ok(Some(rec)) => {
                stats.matched_by_sku += 1;
                rec.key
            }
            Ok(None) => StockKey::marketplace(product.product_id),
            Err(e) => {
                stats.store_errors += 1;
                warn!(shop, sku, error = %e, "sku lookup failed; skipping product");
                return;
            }
        },
        None => StockKey::marketplace(product.product_id),
    };

    let patch = StockRecordPatch {
        marketplace_current: Some(quantity),
        marketplace_product_id: Some(product.product_id),
        marketplace_listing_id: Some(listing.listing_id),
        marketplace_title: Some(listing.title.clone()),
        marketplace_variation: product.variation(),
        sku: sku.map(str::to_string),
        link_sku_requested: linked.map(|_| false),
        ..Default::default()
    };

    match ctx.store.upsert_merge(shop, &key, &patch).await {
        Ok(_) => {
            if linked.is_some() {
                stats.linked += 1;
                debug!(shop, %key, product_id = product.product_id, "sku link consumed");
            }
            observed.mark(Platform::Marketplace, key);
        }
        Err(e) => {
            stats.store_errors += 1;
            warn!(shop, %key, error = %e, "marketplace update merge failed; skipping");
        }
    }
}
