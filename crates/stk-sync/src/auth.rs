//! Per-run platform credentials.
//!
//! Any failure here is fatal for the run: nothing downstream can proceed
//! without a token.

use std::sync::Arc;

use chrono::Utc;
use stk_marketplace::{apply_grant, needs_refresh, token_request, MarketplaceApi};
use stk_primary::{PrimaryApi, PrimaryConnector};
use stk_store::{ShopRecord, ShopStore};
use tracing::{debug, info};

use crate::{Stage, SyncCause, SyncContext, SyncError};

/// Primary client for `shop`, built from the stored access token.
pub fn primary_api(ctx: &SyncContext, shop: &ShopRecord) -> Result<Arc<dyn PrimaryApi>, SyncError> {
    let token = shop
        .primary_access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            SyncError::new(
                Stage::PrimaryAuth,
                SyncCause::MissingCredentials(format!(
                    "no primary access token stored for {}",
                    shop.shop_domain
                )),
            )
        })?;

    ctx.primary
        .connect(&shop.shop_domain, token)
        .map_err(|e| SyncError::new(Stage::PrimaryAuth, e))
}

/// A marketplace access token valid for at least the refresh margin.
///
/// A refreshed (or first-issued) token is persisted before it is returned.
pub async fn marketplace_access_token(ctx: &SyncContext, shop: &ShopRecord) -> Result<String, SyncError> {
    let stage = Stage::MarketplaceAuth;
    let creds = &shop.marketplace;
    let now = Utc::now();

    if !needs_refresh(creds, now, ctx.refresh_margin) {
        if let Some(token) = &creds.access_token {
            debug!(shop = %shop.shop_domain, "reusing stored marketplace token");
            return Ok(token.clone());
        }
    }

    let req = token_request(creds, ctx.redirect_uri.as_deref()).map_err(|e| SyncError::new(stage, e))?;
    let grant_type = req.grant_type();
    let grant = ctx
        .marketplace
        .exchange_token(&req)
        .await
        .map_err(|e| SyncError::new(stage, e))?;

    let updated = apply_grant(creds, &grant);
    ctx.store
        .save_marketplace_credentials(&shop.shop_domain, &updated)
        .await
        .map_err(|e| SyncError::new(stage, e))?;

    info!(
        shop = %shop.shop_domain,
        grant_type,
        expires_at = %grant.expires_at,
        "marketplace token issued"
    );
    Ok(grant.access_token)
}
