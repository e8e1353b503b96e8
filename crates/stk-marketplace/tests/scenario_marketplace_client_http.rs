//! Scenario: marketplace client against a mocked platform.
//!
//! # Invariants under test
//! - Token refresh posts the refresh grant with the client id; expiry is
//!   derived from `expires_in`; an out-of-range lifetime is a decode error.
//! - Reads carry `x-api-key` and bearer authorization.
//! - The user's shop is looked up by the token's user-id prefix.
//! - Listings are paged until a short page.
//! - Inventory write-back is a PUT of the full product array; non-2xx fails.

use std::collections::BTreeMap;

use chrono::Utc;
use httpmock::prelude::*;
use serde_json::json;
use stk_marketplace::{
    MarketplaceApi, MarketplaceClient, MarketplaceClientConfig, MarketplaceError, TokenRequest,
};

fn client(server: &MockServer, page_size: u32) -> MarketplaceClient {
    MarketplaceClient::new(MarketplaceClientConfig {
        api_base_url: server.base_url(),
        token_url: server.url("/v3/public/oauth/token"),
        client_id: "app-key".to_string(),
        page_size,
    })
}

#[tokio::test]
async fn refresh_grant_is_form_encoded() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v3/public/oauth/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("client_id=app-key")
                .body_contains("refresh_token=55.old-refresh");
            then.status(200).json_body(json!({
                "access_token": "55.new-access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "55.new-refresh"
            }));
        })
        .await;

    let before = Utc::now();
    let grant = client(&server, 100)
        .exchange_token(&TokenRequest::RefreshToken {
            refresh_token: "55.old-refresh".to_string(),
        })
        .await
        .unwrap();
    m.assert_async().await;

    assert_eq!(grant.access_token, "55.new-access");
    assert_eq!(grant.refresh_token, "55.new-refresh");
    let secs = (grant.expires_at - before).num_seconds();
    assert!((3599..=3601).contains(&secs), "{secs}");
}

#[tokio::test]
async fn rejected_token_exchange_is_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v3/public/oauth/token");
            then.status(400).json_body(json!({ "error": "invalid_grant" }));
        })
        .await;

    let err = client(&server, 100)
        .exchange_token(&TokenRequest::AuthorizationCode {
            code: "c".to_string(),
            code_verifier: "v".to_string(),
            redirect_uri: "https://app.example/cb".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Api { status: 400, .. }), "{err:?}");
}

#[tokio::test]
async fn out_of_range_token_lifetime_is_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v3/public/oauth/token");
            then.status(200).json_body(json!({
                "access_token": "55.new-access",
                "token_type": "Bearer",
                "expires_in": i64::MAX,
                "refresh_token": "55.new-refresh"
            }));
        })
        .await;

    let err = client(&server, 100)
        .exchange_token(&TokenRequest::RefreshToken {
            refresh_token: "55.old-refresh".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn user_shop_uses_token_prefix_and_headers() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v3/application/users/55/shops")
                .header("x-api-key", "app-key")
                .header("authorization", "Bearer 55.access");
            then.status(200)
                .json_body(json!({ "shop_id": 9001, "shop_name": "MugHouse" }));
        })
        .await;

    let shop = client(&server, 100).user_shop("55.access").await.unwrap();
    m.assert_async().await;
    assert_eq!(shop.shop_id, 9001);
    assert_eq!(shop.shop_name, "MugHouse");
}

#[tokio::test]
async fn listings_are_paged_until_short_page() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v3/application/shops/9001/listings")
                .query_param("limit", "2")
                .query_param("offset", "0");
            then.status(200).json_body(json!({
                "count": 3,
                "results": [
                    { "listing_id": 1, "shop_id": 9001, "title": "Mug", "quantity": 10 },
                    { "listing_id": 2, "shop_id": 9001, "title": "Tee", "quantity": 4 }
                ]
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v3/application/shops/9001/listings")
                .query_param("limit", "2")
                .query_param("offset", "2");
            then.status(200).json_body(json!({
                "count": 3,
                "results": [ { "listing_id": 3, "shop_id": 9001, "title": "Cap", "quantity": 1 } ]
            }));
        })
        .await;

    let listings = client(&server, 2).shop_listings("55.access", 9001).await.unwrap();
    first.assert_async().await;
    second.assert_async().await;
    let ids: Vec<i64> = listings.iter().map(|l| l.listing_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn inventory_read_then_write_back() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v3/application/listings/1/inventory");
            then.status(200).json_body(json!({
                "products": [{
                    "product_id": 501, "sku": "MUG-R", "is_deleted": false,
                    "offerings": [{ "offering_id": 1, "quantity": 7, "is_enabled": true, "is_deleted": false,
                                    "price": { "amount": 900, "divisor": 100, "currency_code": "USD" } }],
                    "property_values": []
                }],
                "price_on_property": [],
                "quantity_on_property": [],
                "sku_on_property": []
            }));
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v3/application/listings/1/inventory")
                .header("authorization", "Bearer 55.access")
                .body_contains(r#""sku":"MUG-R""#)
                .body_contains(r#""quantity":4"#)
                .body_contains(r#""price":9.0"#);
            then.status(200).json_body(json!({}));
        })
        .await;

    let c = client(&server, 100);
    let inv = c.listing_inventory("55.access", 1).await.unwrap();
    assert_eq!(inv.product(501).and_then(|p| p.quantity()), Some(7));

    let update = inv.to_update(&BTreeMap::from([(501, 4)]), &BTreeMap::new());
    c.update_listing_inventory("55.access", 1, &update).await.unwrap();
    put.assert_async().await;

    let err = c
        .update_listing_inventory("55.access", 2, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Api { status: 404, .. }));
}
