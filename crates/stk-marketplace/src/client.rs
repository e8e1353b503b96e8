use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::types::{ListingsPage, TokenResponse};
use crate::{
    user_id_from_token, InventoryUpdate, Listing, ListingInventory, MarketplaceApi,
    MarketplaceError, MarketplaceShop, TokenGrant, TokenRequest,
};

pub const DEFAULT_API_BASE_URL: &str = "https://openapi.etsy.com";
pub const DEFAULT_TOKEN_URL: &str = "https://api.etsy.com/v3/public/oauth/token";

/// `now + expires_in` seconds; an out-of-range lifetime is a decode error.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, MarketplaceError> {
    Duration::try_seconds(expires_in)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| MarketplaceError::Decode(format!("token expires_in out of range: {expires_in}")))
}

#[derive(Clone)]
pub struct MarketplaceClientConfig {
    pub api_base_url: String,
    pub token_url: String,
    /// Application key; sent as `x-api-key` and as the OAuth client id.
    pub client_id: String,
    pub page_size: u32,
}

impl MarketplaceClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: client_id.into(),
            page_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct MarketplaceClient {
    http: reqwest::Client,
    cfg: MarketplaceClientConfig,
}

impl std::fmt::Debug for MarketplaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceClient")
            .field("api_base_url", &self.cfg.api_base_url)
            .field("token_url", &self.cfg.token_url)
            .finish_non_exhaustive()
    }
}

impl MarketplaceClient {
    pub fn new(mut cfg: MarketplaceClientConfig) -> Self {
        cfg.api_base_url = cfg.api_base_url.trim_end_matches('/').to_string();
        cfg.page_size = cfg.page_size.clamp(1, 100);
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/application{}", self.cfg.api_base_url, path)
    }

    fn authed(&self, req: reqwest::RequestBuilder, access_token: &str) -> reqwest::RequestBuilder {
        req.header("x-api-key", &self.cfg.client_id)
            .header("authorization", format!("Bearer {access_token}"))
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, MarketplaceError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketplaceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| MarketplaceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketplaceApi for MarketplaceClient {
    async fn exchange_token(&self, req: &TokenRequest) -> Result<TokenGrant, MarketplaceError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", req.grant_type()),
            ("client_id", self.cfg.client_id.as_str()),
        ];
        match req {
            TokenRequest::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.as_str()));
            }
            TokenRequest::AuthorizationCode {
                code,
                code_verifier,
                redirect_uri,
            } => {
                form.push(("redirect_uri", redirect_uri.as_str()));
                form.push(("code", code.as_str()));
                form.push(("code_verifier", code_verifier.as_str()));
            }
        }

        debug!(grant_type = req.grant_type(), "requesting marketplace token");
        let resp = self.http.post(&self.cfg.token_url).form(&form).send().await?;
        let body: TokenResponse = Self::read_json(resp).await?;

        let expires_at = expiry_after(Utc::now(), body.expires_in)?;

        Ok(TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at,
        })
    }

    async fn user_shop(&self, access_token: &str) -> Result<MarketplaceShop, MarketplaceError> {
        let user = user_id_from_token(access_token);
        let req = self.http.get(self.url(&format!("/users/{user}/shops")));
        let resp = self.authed(req, access_token).send().await?;
        let shop: MarketplaceShop = Self::read_json(resp).await?;
        debug!(shop_id = shop.shop_id, shop_name = %shop.shop_name, "marketplace shop resolved");
        Ok(shop)
    }

    async fn shop_listings(
        &self,
        access_token: &str,
        shop_id: i64,
    ) -> Result<Vec<Listing>, MarketplaceError> {
        let limit = self.cfg.page_size;
        let mut offset: u64 = 0;
        let mut out: Vec<Listing> = Vec::new();

        loop {
            let req = self
                .http
                .get(self.url(&format!("/shops/{shop_id}/listings")))
                .query(&[("limit", limit as u64), ("offset", offset)]);
            let resp = self.authed(req, access_token).send().await?;
            let page: ListingsPage = Self::read_json(resp).await?;

            let got = page.results.len() as u64;
            out.extend(page.results);
            offset += got;

            if got < limit as u64 || offset >= page.count.max(0) as u64 {
                break;
            }
        }

        info!(shop_id, listings = out.len(), "marketplace listings fetched");
        Ok(out)
    }

    async fn listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
    ) -> Result<ListingInventory, MarketplaceError> {
        let req = self
            .http
            .get(self.url(&format!("/listings/{listing_id}/inventory")));
        let resp = self.authed(req, access_token).send().await?;
        Self::read_json(resp).await
    }

    async fn update_listing_inventory(
        &self,
        access_token: &str,
        listing_id: i64,
        update: &InventoryUpdate,
    ) -> Result<(), MarketplaceError> {
        let req = self
            .http
            .put(self.url(&format!("/listings/{listing_id}/inventory")))
            .json(update);
        let resp = self.authed(req, access_token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketplaceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        info!(listing_id, products = update.products.len(), "marketplace inventory updated");
        Ok(())
    }
}
