//! In-process marketplace platform.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use stk_marketplace::{
    InventoryUpdate, Listing, ListingInventory, ListingProduct, MarketplaceApi, MarketplaceError,
    MarketplaceShop, Money, Offering, TokenGrant, TokenRequest,
};

pub const FAKE_SHOP_ID: i64 = 4242;

struct State {
    listings: BTreeMap<i64, (String, ListingInventory)>,
    unreadable: BTreeSet<i64>,
    fail_updates: BTreeSet<i64>,
    fail_token: bool,
    grants: Vec<&'static str>,
    updates: Vec<(i64, InventoryUpdate)>,
    tokens_seen: Vec<String>,
}

#[derive(Clone)]
pub struct FakeMarketplace {
    state: Arc<Mutex<State>>,
}

impl Default for FakeMarketplace {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                listings: BTreeMap::new(),
                unreadable: BTreeSet::new(),
                fail_updates: BTreeSet::new(),
                fail_token: false,
                grants: Vec::new(),
                updates: Vec::new(),
                tokens_seen: Vec::new(),
            })),
        }
    }
}

fn product(product_id: i64, sku: &str, quantity: i64) -> ListingProduct {
    ListingProduct {
        product_id,
        sku: sku.to_string(),
        is_deleted: false,
        offerings: vec![Offering {
            offering_id: product_id * 10,
            quantity,
            is_enabled: true,
            is_deleted: false,
            price: Money {
                amount: 900,
                divisor: 100,
                currency_code: "USD".to_string(),
            },
        }],
        property_values: Vec::new(),
    }
}

impl FakeMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a single-offering product to `listing_id`, creating the listing.
    pub fn with_product(self, listing_id: i64, product_id: i64, sku: &str, quantity: i64) -> Self {
        {
            let mut st = self.state();
            let (_, inv) = st.listings.entry(listing_id).or_insert_with(|| {
                (
                    format!("Listing {listing_id}"),
                    ListingInventory {
                        products: Vec::new(),
                        price_on_property: Vec::new(),
                        quantity_on_property: Vec::new(),
                        sku_on_property: Vec::new(),
                    },
                )
            });
            inv.products.push(product(product_id, sku, quantity));
        }
        self
    }

    fn with_product_mut<R>(&self, product_id: i64, f: impl FnOnce(&mut ListingProduct) -> R) -> Option<R> {
        let mut st = self.state();
        st.listings
            .values_mut()
            .flat_map(|(_, inv)| inv.products.iter_mut())
            .find(|p| p.product_id == product_id)
            .map(f)
    }

    /// Simulate a sale or restock made directly on the marketplace.
    pub fn set_quantity(&self, product_id: i64, quantity: i64) {
        self.with_product_mut(product_id, |p| {
            if let Some(o) = p.offerings.first_mut() {
                o.quantity = quantity;
            }
        });
    }

    pub fn quantity(&self, product_id: i64) -> Option<i64> {
        self.with_product_mut(product_id, |p| p.quantity()).flatten()
    }

    pub fn sku(&self, product_id: i64) -> Option<String> {
        self.with_product_mut(product_id, |p| p.sku.clone())
    }

    pub fn make_unreadable(&self, listing_id: i64) {
        self.state().unreadable.insert(listing_id);
    }

    pub fn fail_updates_for(&self, listing_id: i64) {
        self.state().fail_updates.insert(listing_id);
    }

    pub fn fail_token_exchange(&self) {
        self.state().fail_token = true;
    }

    /// Grant types requested so far.
    pub fn grants(&self) -> Vec<&'static str> {
        self.state().grants.clone()
    }

    pub fn updates(&self) -> Vec<(i64, InventoryUpdate)> {
        self.state().updates.clone()
    }

    /// Access tokens presented on read and write calls.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.state().tokens_seen.clone()
    }
}

#[async_trait]
impl MarketplaceApi for FakeMarketplace {
    async fn exchange_token(&self, req: &TokenRequest) -> Result<TokenGrant, MarketplaceError> {
        let mut st = self.state();
        if st.fail_token {
            return Err(MarketplaceError::Api {
                status: 400,
                body: "{\"error\":\"invalid_grant\"}".to_string(),
            });
        }
        st.grants.push(req.grant_type());
        let n = st.grants.len();
        Ok(TokenGrant {
            access_token: format!("77.access-{n}"),
            refresh_token: format!("77.refresh-{n}"),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn user_shop(&self, access_token: &str) -> Result<MarketplaceShop, MarketplaceError> {
        self.state().tokens_seen.push(access_token.to_string());
        Ok(MarketplaceShop {
            shop_id: FAKE_SHOP_ID,
            shop_name: "FakeShop".to_string(),
        })
    }

    async fn shop_listings(
        &self,
        access_token: &str,
        shop_id: i64,
    ) -> Result<Vec<Listing>, MarketplaceError> {
        let mut st = self.state();
        st.tokens_seen.push(access_token.to_string());
        Ok(st
            .listings
            .iter()
            .map(|(id, (title, inv))| Listing {
                listing_id: *id,
                shop_id,
                title: title.clone(),
                state: "active".to_string(),
                quantity: inv.products.iter().filter_map(|p| p.quantity()).sum(),
            })
            .collect())
    }

    async fn listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
    ) -> Result<ListingInventory, MarketplaceError> {
        let mut st = self.state();
        st.tokens_seen.push(access_token.to_string());
        if st.unreadable.contains(&listing_id) {
            return Err(MarketplaceError::Api {
                status: 500,
                body: "upstream error".to_string(),
            });
        }
        st.listings
            .get(&listing_id)
            .map(|(_, inv)| inv.clone())
            .ok_or_else(|| MarketplaceError::Api {
                status: 404,
                body: format!("listing {listing_id} not found"),
            })
    }

    async fn update_listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
        update: &InventoryUpdate,
    ) -> Result<(), MarketplaceError> {
        let mut st = self.state();
        st.tokens_seen.push(access_token.to_string());
        if st.fail_updates.contains(&listing_id) {
            return Err(MarketplaceError::Api {
                status: 400,
                body: "invalid inventory payload".to_string(),
            });
        }
        let Some((_, inv)) = st.listings.get_mut(&listing_id) else {
            return Err(MarketplaceError::Api {
                status: 404,
                body: format!("listing {listing_id} not found"),
            });
        };

        // The payload lists syncable products in listing order.
        let live = inv.products.iter_mut().filter(|p| p.is_syncable());
        for (p, u) in live.zip(update.products.iter()) {
            p.sku = u.sku.clone();
            if let (Some(o), Some(uo)) = (p.offerings.first_mut(), u.offerings.first()) {
                o.quantity = uo.quantity;
            }
        }
        st.updates.push((listing_id, update.clone()));
        Ok(())
    }
}
