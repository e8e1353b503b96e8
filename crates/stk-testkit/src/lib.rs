//! stk-testkit
//!
//! In-process fakes of both platforms plus fixtures for end-to-end runs of
//! the sync pipeline against the in-memory store. The scenario tests under
//! `tests/` drive [`stk_sync::run_sync_once`] through these.

mod fake_marketplace;
mod fake_primary;

pub use fake_marketplace::{FakeMarketplace, FAKE_SHOP_ID};
pub use fake_primary::{FakeItem, FakePrimary};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stk_bulk::PollPolicy;
use stk_store::{MarketplaceCredentials, MemoryStore, ShopRecord, StockKey, SyncStore};
use stk_sync::SyncContext;

pub const SHOP: &str = "demo.myshopify.com";
pub const PRIMARY_TOKEN: &str = "primary-test-token";

pub fn item_gid(number: u64) -> String {
    format!("gid://shopify/InventoryItem/{number}")
}

pub fn location_gid(number: u64) -> String {
    format!("gid://shopify/Location/{number}")
}

pub fn item_key(number: u64) -> StockKey {
    StockKey::new(item_gid(number))
}

/// Shop with a primary token and a marketplace token valid for `valid_for`.
pub fn shop_with_token(valid_for: chrono::Duration) -> ShopRecord {
    let mut shop = ShopRecord::new(SHOP);
    shop.primary_access_token = Some(PRIMARY_TOKEN.to_string());
    shop.marketplace = MarketplaceCredentials {
        onboarded: true,
        access_token: Some("77.stored".to_string()),
        refresh_token: Some("77.refresh-0".to_string()),
        expires_at: Some(Utc::now() + valid_for),
        code_reference: None,
        code_verifier: None,
    };
    shop
}

/// Shop whose stored marketplace token needs no refresh.
pub fn onboarded_shop() -> ShopRecord {
    shop_with_token(chrono::Duration::hours(2))
}

/// Fast poll policy so non-timing scenarios do not wait.
pub fn fast_poll() -> PollPolicy {
    PollPolicy::new(3, Duration::from_millis(1))
}

/// Context wiring both fakes to `store`.
pub fn harness(store: Arc<MemoryStore>, primary: &FakePrimary, marketplace: &FakeMarketplace) -> SyncContext {
    let store: Arc<dyn SyncStore> = store;
    SyncContext::new(store, Arc::new(primary.clone()), Arc::new(marketplace.clone()))
        .with_poll_policy(fast_poll())
        .with_redirect_uri("https://app.example/callback")
}
