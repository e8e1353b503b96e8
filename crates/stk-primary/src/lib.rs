//! stk-primary
//!
//! Client for the primary shop platform (platform A): bulk export
//! submission/status over GraphQL, streaming retrieval of the NDJSON result,
//! and absolute stock write-back per inventory item and location.
//!
//! The access token is supplied per shop by the caller; do not log it.

mod client;
mod lines;
pub mod queries;

pub use client::{PrimaryClient, PrimaryClientConfig, DEFAULT_API_VERSION};
pub use lines::ResultLines;

use std::sync::Arc;

use async_trait::async_trait;
use stk_bulk::{BulkError, BulkExportApi, LineSource};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimaryError {
    #[error("primary transport error: {0}")]
    Transport(String),
    #[error("primary http error status={status}: {body}")]
    Api { status: u16, body: String },
    #[error("primary graphql error: {0}")]
    Graphql(String),
    #[error("primary decode error: {0}")]
    Decode(String),
    #[error("primary client config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PrimaryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PrimaryError::Decode(e.to_string())
        } else {
            PrimaryError::Transport(e.to_string())
        }
    }
}

impl From<PrimaryError> for BulkError {
    fn from(e: PrimaryError) -> Self {
        match e {
            PrimaryError::Decode(m) => BulkError::Decode(m),
            other => BulkError::Transport(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Platform boundary
// ---------------------------------------------------------------------------

/// Absolute quantity to set for one inventory item at one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelWrite {
    pub location_id: String,
    pub inventory_item_id: String,
    pub available: i64,
}

#[async_trait]
pub trait PrimaryApi: BulkExportApi {
    /// Open a completed export's result for line-by-line reading.
    async fn open_export(&self, url: &str) -> Result<Box<dyn LineSource>, BulkError>;

    /// Set the available quantity. Any non-success response is an error.
    async fn set_available(&self, write: &LevelWrite) -> Result<(), PrimaryError>;
}

/// Builds a per-shop [`PrimaryApi`] once the shop's access token is known.
pub trait PrimaryConnector: Send + Sync {
    fn connect(&self, shop: &str, access_token: &str) -> Result<Arc<dyn PrimaryApi>, PrimaryError>;
}

/// Connector producing [`PrimaryClient`]s.
#[derive(Debug, Clone)]
pub struct HttpPrimaryConnector {
    pub api_version: String,
    /// Overrides `https://<shop>`; used for proxies and tests.
    pub base_url: Option<String>,
}

impl HttpPrimaryConnector {
    pub fn new(api_version: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_version: api_version.into(),
            base_url,
        }
    }
}

impl Default for HttpPrimaryConnector {
    fn default() -> Self {
        Self::new(DEFAULT_API_VERSION, None)
    }
}

impl PrimaryConnector for HttpPrimaryConnector {
    fn connect(&self, shop: &str, access_token: &str) -> Result<Arc<dyn PrimaryApi>, PrimaryError> {
        let client = PrimaryClient::new(PrimaryClientConfig {
            shop: shop.to_string(),
            access_token: access_token.to_string(),
            api_version: self.api_version.clone(),
            base_url: self.base_url.clone(),
        })?;
        Ok(Arc::new(client))
    }
}

/// Numeric tail of a global id (`gid://shopify/Location/42` -> `42`).
pub fn numeric_id(gid: &str) -> &str {
    match gid.rfind('/') {
        Some(i) => &gid[i + 1..],
        None => gid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_takes_tail() {
        assert_eq!(numeric_id("gid://shopify/InventoryItem/123"), "123");
        assert_eq!(numeric_id("456"), "456");
    }

    #[test]
    fn decode_errors_stay_decode_errors() {
        let e: BulkError = PrimaryError::Decode("bad json".to_string()).into();
        assert_eq!(e, BulkError::Decode("bad json".to_string()));
        let e: BulkError = PrimaryError::Api {
            status: 502,
            body: "bad gateway".to_string(),
        }
        .into();
        assert!(e.is_transient());
    }
}
