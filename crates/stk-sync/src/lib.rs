//! stk-sync
//!
//! One full reconciliation pass for one shop.
//!
//! Stages run strictly in order; each completes before the next begins:
//!
//! 1. overrides: operator forced quantities and SKU links
//! 2. primary-auth, primary-levels, primary-variants: bulk exports from the
//!    primary platform, ingested into the store
//! 3. marketplace-auth, marketplace-listings: token, shop, listing inventories
//! 4. reconcile: per-key deltas and override plan
//! 5. apply-primary, apply-marketplace: write-back and baseline update
//!
//! A failure in stages 2-3 aborts the run before anything is written.

mod auth;
mod context;
mod marketplace_pass;
mod pipeline;
mod primary_pass;
mod writers;

pub use auth::{marketplace_access_token, primary_api};
pub use context::SyncContext;
pub use marketplace_pass::{ingest_marketplace, ListingCache, MarketplacePassStats};
pub use pipeline::run_sync_once;
pub use primary_pass::{ingest_primary_export, PrimaryPassStats};
pub use writers::{MarketplaceWriter, PrimaryWriter};

use serde::Serialize;
use stk_bulk::{BulkError, IngestStats};
use stk_marketplace::MarketplaceError;
use stk_primary::PrimaryError;
use stk_reconcile::{ApplySummary, Platform, ReconcileStats};
use stk_store::StoreError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Overrides,
    PrimaryAuth,
    PrimaryLevels,
    PrimaryVariants,
    MarketplaceAuth,
    MarketplaceListings,
    Reconcile,
    ApplyPrimary,
    ApplyMarketplace,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Overrides => "overrides",
            Stage::PrimaryAuth => "primary-auth",
            Stage::PrimaryLevels => "primary-levels",
            Stage::PrimaryVariants => "primary-variants",
            Stage::MarketplaceAuth => "marketplace-auth",
            Stage::MarketplaceListings => "marketplace-listings",
            Stage::Reconcile => "reconcile",
            Stage::ApplyPrimary => "apply-primary",
            Stage::ApplyMarketplace => "apply-marketplace",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncCause {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bulk(#[from] BulkError),
    #[error(transparent)]
    Primary(#[from] PrimaryError),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    /// Every attempted write to the platform failed.
    #[error("systemic write failure on {platform}: {attempted} attempted, none applied")]
    Systemic { platform: Platform, attempted: u64 },
}

/// Terminal failure of a run, attributed to the stage that raised it.
#[derive(Debug, Error)]
#[error("sync failed at stage {stage}: {cause}")]
pub struct SyncError {
    pub stage: Stage,
    pub cause: SyncCause,
}

impl SyncError {
    pub fn new(stage: Stage, cause: impl Into<SyncCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideStats {
    pub quantities: u64,
    pub links: u64,
    /// Overrides could not be read; the run proceeded without them.
    pub load_failed: bool,
}

/// Per-stage counts of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub shop: String,
    pub overrides: OverrideStats,
    pub primary_levels: PrimaryPassStats,
    pub primary_variants: PrimaryPassStats,
    pub marketplace: MarketplacePassStats,
    pub reconcile: ReconcileStats,
    pub apply_primary: ApplySummary,
    pub apply_marketplace: ApplySummary,
    /// Listings written only to carry a SKU link.
    pub relinked_listings: u64,
}

impl RunSummary {
    pub fn new(shop: &str) -> Self {
        Self {
            shop: shop.to_string(),
            ..Default::default()
        }
    }

    /// Lines read across both primary exports.
    pub fn primary_lines(&self) -> IngestStats {
        let a = self.primary_levels.ingest;
        let b = self.primary_variants.ingest;
        IngestStats {
            lines: a.lines + b.lines,
            accepted: a.accepted + b.accepted,
            malformed: a.malformed + b.malformed,
            filtered: a.filtered + b.filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names_the_stage() {
        let e = SyncError::new(
            Stage::PrimaryLevels,
            BulkError::Timeout {
                job_id: "gid://shopify/BulkOperation/1".to_string(),
                attempts: 12,
                last_error: None,
            },
        );
        let msg = e.to_string();
        assert!(msg.starts_with("sync failed at stage primary-levels"), "got: {msg}");
        assert!(msg.contains("not ready after 12 polls"), "got: {msg}");
    }
}
