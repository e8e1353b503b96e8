//! stk-store
//!
//! Persistent state for the sync engine: one [`StockRecord`] per stocked
//! unit plus one [`ShopRecord`] per connected shop (primary access token and
//! marketplace OAuth material).
//!
//! Two backends implement the same traits:
//! - [`MemoryStore`] for tests and `--memory` runs
//! - [`PgStore`] backed by PostgreSQL (JSONB documents, embedded migrations)

mod memory;
mod pg;
mod record;

pub use memory::MemoryStore;
pub use pg::{connect, connect_from_env, DbStatus, PgStore, ENV_DB_URL};
pub use record::{Platform, StockKey, StockLevels, StockRecord, StockRecordPatch};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored document could not be decoded: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Stock records
// ---------------------------------------------------------------------------

/// Operator request flags that can be queried across a shop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordFlag {
    OverrideRequested,
    LinkSkuRequested,
}

impl RecordFlag {
    pub fn is_set(&self, rec: &StockRecord) -> bool {
        match self {
            RecordFlag::OverrideRequested => rec.override_requested,
            RecordFlag::LinkSkuRequested => rec.link_sku_requested,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            RecordFlag::OverrideRequested => "override_requested",
            RecordFlag::LinkSkuRequested => "link_sku_requested",
        }
    }
}

#[async_trait]
pub trait StockRecordStore: Send + Sync {
    async fn get(&self, shop: &str, key: &StockKey) -> StoreResult<Option<StockRecord>>;

    /// First record carrying `sku`, in key order.
    async fn find_by_sku(&self, shop: &str, sku: &str) -> StoreResult<Option<StockRecord>>;

    /// All records with `flag` set, in key order.
    async fn get_all_where(&self, shop: &str, flag: RecordFlag) -> StoreResult<Vec<StockRecord>>;

    /// Create-or-merge. Absent patch fields are left as stored. Returns the
    /// record as persisted.
    async fn upsert_merge(
        &self,
        shop: &str,
        key: &StockKey,
        patch: &StockRecordPatch,
    ) -> StoreResult<StockRecord>;
}

// ---------------------------------------------------------------------------
// Shops
// ---------------------------------------------------------------------------

/// Marketplace OAuth material for one shop.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceCredentials {
    /// `true` once an authorization code has been exchanged successfully.
    #[serde(default)]
    pub onboarded: bool,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// One-time authorization code captured during onboarding.
    #[serde(default)]
    pub code_reference: Option<String>,
    /// PKCE verifier paired with `code_reference`.
    #[serde(default)]
    pub code_verifier: Option<String>,
}

// Tokens must never reach logs.
impl std::fmt::Debug for MarketplaceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<REDACTED>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("MarketplaceCredentials")
            .field("onboarded", &self.onboarded)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("code_reference", &redact(&self.code_reference))
            .field("code_verifier", &redact(&self.code_verifier))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub shop_domain: String,
    #[serde(default)]
    pub primary_access_token: Option<String>,
    #[serde(default)]
    pub marketplace: MarketplaceCredentials,
    #[serde(default)]
    pub marketplace_shop_id: Option<i64>,
    #[serde(default)]
    pub marketplace_shop_name: Option<String>,
}

impl ShopRecord {
    pub fn new(shop_domain: impl Into<String>) -> Self {
        Self {
            shop_domain: shop_domain.into(),
            primary_access_token: None,
            marketplace: MarketplaceCredentials::default(),
            marketplace_shop_id: None,
            marketplace_shop_name: None,
        }
    }
}

impl std::fmt::Debug for ShopRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopRecord")
            .field("shop_domain", &self.shop_domain)
            .field(
                "primary_access_token",
                &self.primary_access_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("marketplace", &self.marketplace)
            .field("marketplace_shop_id", &self.marketplace_shop_id)
            .field("marketplace_shop_name", &self.marketplace_shop_name)
            .finish()
    }
}

#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn get_shop(&self, shop: &str) -> StoreResult<ShopRecord>;

    /// Insert or replace a whole shop record (onboarding and fixtures).
    async fn put_shop(&self, record: &ShopRecord) -> StoreResult<()>;

    async fn save_marketplace_credentials(
        &self,
        shop: &str,
        creds: &MarketplaceCredentials,
    ) -> StoreResult<()>;

    async fn save_marketplace_shop(&self, shop: &str, shop_id: i64, name: &str) -> StoreResult<()>;
}

/// Everything the sync run needs from persistence.
pub trait SyncStore: StockRecordStore + ShopStore {}

impl<T: StockRecordStore + ShopStore> SyncStore for T {}
