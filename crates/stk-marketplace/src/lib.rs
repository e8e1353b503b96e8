//! stk-marketplace
//!
//! Client for the marketplace platform (platform B): OAuth token exchange
//! and refresh, shop and listing discovery, per-listing inventory reads and
//! full-listing inventory write-back.
//!
//! Token material is passed per call and never logged.

mod client;
mod types;

pub use client::{MarketplaceClient, MarketplaceClientConfig, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL};
pub use types::{
    InventoryUpdate, Listing, ListingInventory, ListingProduct, MarketplaceShop, Money, Offering,
    OfferingUpdate, ProductUpdate, PropertyValue, PropertyValueUpdate, TokenGrant, TokenRequest,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use stk_store::MarketplaceCredentials;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketplaceError {
    #[error("marketplace transport error: {0}")]
    Transport(String),
    #[error("marketplace http error status={status}: {body}")]
    Api { status: u16, body: String },
    #[error("marketplace decode error: {0}")]
    Decode(String),
    /// Stored OAuth state cannot produce a token request.
    #[error("marketplace credentials incomplete: {0}")]
    Credentials(String),
}

impl From<reqwest::Error> for MarketplaceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            MarketplaceError::Decode(e.to_string())
        } else {
            MarketplaceError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Platform boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn exchange_token(&self, req: &TokenRequest) -> Result<TokenGrant, MarketplaceError>;

    /// Shop owned by the user the token was issued to.
    async fn user_shop(&self, access_token: &str) -> Result<MarketplaceShop, MarketplaceError>;

    /// Every listing of `shop_id`, across pages.
    async fn shop_listings(
        &self,
        access_token: &str,
        shop_id: i64,
    ) -> Result<Vec<Listing>, MarketplaceError>;

    async fn listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
    ) -> Result<ListingInventory, MarketplaceError>;

    async fn update_listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
        update: &InventoryUpdate,
    ) -> Result<(), MarketplaceError>;
}

// ---------------------------------------------------------------------------
// Token lifecycle
// ---------------------------------------------------------------------------

/// Stored access token usable as-is: onboarded, present, and expiring more
/// than `margin` after `now`.
pub fn needs_refresh(creds: &MarketplaceCredentials, now: DateTime<Utc>, margin: Duration) -> bool {
    match (&creds.access_token, creds.expires_at) {
        (Some(t), Some(exp)) if creds.onboarded && !t.is_empty() => now + margin >= exp,
        _ => true,
    }
}

/// Grant to request for the stored state: refresh once onboarded, otherwise
/// exchange the captured authorization code.
pub fn token_request(
    creds: &MarketplaceCredentials,
    redirect_uri: Option<&str>,
) -> Result<TokenRequest, MarketplaceError> {
    if creds.onboarded {
        let refresh_token = creds
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MarketplaceError::Credentials("no refresh token stored".to_string()))?;
        return Ok(TokenRequest::RefreshToken { refresh_token });
    }

    let code = creds
        .code_reference
        .clone()
        .ok_or_else(|| MarketplaceError::Credentials("shop not onboarded: no authorization code".to_string()))?;
    let code_verifier = creds
        .code_verifier
        .clone()
        .ok_or_else(|| MarketplaceError::Credentials("no code verifier stored".to_string()))?;
    let redirect_uri = redirect_uri
        .map(str::to_string)
        .ok_or_else(|| MarketplaceError::Credentials("redirect uri not configured".to_string()))?;

    Ok(TokenRequest::AuthorizationCode {
        code,
        code_verifier,
        redirect_uri,
    })
}

/// Credentials after a successful exchange.
pub fn apply_grant(creds: &MarketplaceCredentials, grant: &TokenGrant) -> MarketplaceCredentials {
    MarketplaceCredentials {
        onboarded: true,
        access_token: Some(grant.access_token.clone()),
        refresh_token: if grant.refresh_token.is_empty() {
            creds.refresh_token.clone()
        } else {
            Some(grant.refresh_token.clone())
        },
        expires_at: Some(grant.expires_at),
        code_reference: creds.code_reference.clone(),
        code_verifier: creds.code_verifier.clone(),
    }
}

/// User id embedded in an access token (the part before the first `.`).
pub fn user_id_from_token(access_token: &str) -> &str {
    access_token.split('.').next().unwrap_or(access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn onboarded(expires: &str) -> MarketplaceCredentials {
        MarketplaceCredentials {
            onboarded: true,
            access_token: Some("77.tok".to_string()),
            refresh_token: Some("77.ref".to_string()),
            expires_at: Some(at(expires)),
            ..Default::default()
        }
    }

    #[test]
    fn refresh_threshold_is_margin_before_expiry() {
        let now = at("2024-05-01T10:00:00Z");
        let margin = Duration::minutes(10);
        assert!(!needs_refresh(&onboarded("2024-05-01T10:30:00Z"), now, margin));
        assert!(needs_refresh(&onboarded("2024-05-01T10:09:59Z"), now, margin));
        assert!(needs_refresh(&onboarded("2024-05-01T09:00:00Z"), now, margin));
        assert!(needs_refresh(&MarketplaceCredentials::default(), now, margin));
    }

    #[test]
    fn grant_type_follows_onboarding() {
        let req = token_request(&onboarded("2024-05-01T10:30:00Z"), None).unwrap();
        assert_eq!(req.grant_type(), "refresh_token");

        let fresh = MarketplaceCredentials {
            code_reference: Some("code-1".to_string()),
            code_verifier: Some("verifier-1".to_string()),
            ..Default::default()
        };
        let req = token_request(&fresh, Some("https://app.example/callback")).unwrap();
        assert_eq!(req.grant_type(), "authorization_code");

        let err = token_request(&MarketplaceCredentials::default(), Some("x")).unwrap_err();
        assert!(matches!(err, MarketplaceError::Credentials(_)));
    }

    #[test]
    fn grant_marks_onboarded_and_keeps_refresh_token_when_absent() {
        let before = onboarded("2024-05-01T10:00:00Z");
        let grant = TokenGrant {
            access_token: "77.new".to_string(),
            refresh_token: String::new(),
            expires_at: at("2024-05-01T11:00:00Z"),
        };
        let after = apply_grant(&before, &grant);
        assert!(after.onboarded);
        assert_eq!(after.access_token.as_deref(), Some("77.new"));
        assert_eq!(after.refresh_token.as_deref(), Some("77.ref"));
    }

    #[test]
    fn user_id_is_token_prefix() {
        assert_eq!(user_id_from_token("12345.abcdef"), "12345");
        assert_eq!(user_id_from_token("opaque"), "opaque");
    }
}
