use std::sync::Arc;
use std::time::Duration;

use stk_bulk::PollPolicy;
use stk_config::secrets::ResolvedSecrets;
use stk_config::SyncConfig;
use stk_marketplace::{MarketplaceApi, MarketplaceClient, MarketplaceClientConfig};
use stk_primary::{HttpPrimaryConnector, PrimaryConnector};
use stk_store::SyncStore;

/// Everything one run needs, built once and passed down explicitly.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn SyncStore>,
    pub primary: Arc<dyn PrimaryConnector>,
    pub marketplace: Arc<dyn MarketplaceApi>,
    pub poll: PollPolicy,
    /// A stored marketplace token closer than this to expiry is refreshed.
    pub refresh_margin: chrono::Duration,
    /// Needed only while a shop is still completing onboarding.
    pub redirect_uri: Option<String>,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn SyncStore>,
        primary: Arc<dyn PrimaryConnector>,
        marketplace: Arc<dyn MarketplaceApi>,
    ) -> Self {
        Self {
            store,
            primary,
            marketplace,
            poll: PollPolicy::default(),
            refresh_margin: chrono::Duration::minutes(10),
            redirect_uri: None,
        }
    }

    /// Context backed by the real platform clients.
    pub fn from_config(cfg: &SyncConfig, secrets: &ResolvedSecrets, store: Arc<dyn SyncStore>) -> Self {
        let primary = HttpPrimaryConnector::new(
            cfg.primary.api_version.clone(),
            cfg.primary.base_url.clone(),
        );

        let mut mcfg = MarketplaceClientConfig::new(secrets.marketplace_client_id.clone());
        mcfg.api_base_url = cfg.marketplace.api_base_url.clone();
        mcfg.token_url = cfg.marketplace.token_url.clone();
        mcfg.page_size = cfg.marketplace.listings_page_size;
        let marketplace = MarketplaceClient::new(mcfg);

        let refresh_margin = i64::try_from(cfg.marketplace.refresh_margin_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::minutes(10));

        Self {
            store,
            primary: Arc::new(primary),
            marketplace: Arc::new(marketplace),
            poll: PollPolicy::new(
                cfg.bulk.max_attempts,
                Duration::from_secs(cfg.bulk.interval_secs),
            ),
            refresh_margin,
            redirect_uri: secrets.marketplace_redirect_uri.clone(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_refresh_margin(mut self, margin: chrono::Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }
}
