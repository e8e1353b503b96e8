//! Scenario: create-or-merge semantics and flag queries on the in-memory store.
//!
//! # Invariants under test
//! - Upserting an unknown key creates the record.
//! - A later partial patch never erases fields it does not carry.
//! - Flag queries return only flagged records, in key order, per shop.

use stk_store::{
    MarketplaceCredentials, MemoryStore, RecordFlag, ShopRecord, ShopStore, StockKey,
    StockRecordPatch, StockRecordStore, StoreError,
};

const SHOP: &str = "demo.myshopify.com";

#[tokio::test]
async fn upsert_creates_then_merges() {
    let store = MemoryStore::new();
    let key = StockKey::new("gid://shopify/InventoryItem/11");

    assert!(store.get(SHOP, &key).await.unwrap().is_none());

    store
        .upsert_merge(
            SHOP,
            &key,
            &StockRecordPatch {
                sku: Some("TEE-S".to_string()),
                variant_name: Some("Tee - S".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let rec = store
        .upsert_merge(
            SHOP,
            &key,
            &StockRecordPatch {
                primary_current: Some(12),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(rec.sku.as_deref(), Some("TEE-S"));
    assert_eq!(rec.variant_name.as_deref(), Some("Tee - S"));
    assert_eq!(rec.primary.current, 12);
    assert!(rec.updated_at.is_some());

    let by_sku = store.find_by_sku(SHOP, "TEE-S").await.unwrap().unwrap();
    assert_eq!(by_sku.key, key);
    assert!(store.find_by_sku("other.shop", "TEE-S").await.unwrap().is_none());
}

#[tokio::test]
async fn flag_queries_are_filtered_and_ordered() {
    let store = MemoryStore::new();
    for (k, flagged) in [("k3", true), ("k1", true), ("k2", false)] {
        store
            .upsert_merge(
                SHOP,
                &StockKey::new(k),
                &StockRecordPatch {
                    override_requested: Some(flagged),
                    override_value: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let hits = store
        .get_all_where(SHOP, RecordFlag::OverrideRequested)
        .await
        .unwrap();
    let keys: Vec<&str> = hits.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k3"]);

    let links = store
        .get_all_where(SHOP, RecordFlag::LinkSkuRequested)
        .await
        .unwrap();
    assert!(links.is_empty());
}

#[tokio::test]
async fn shop_credentials_are_persisted() {
    let store = MemoryStore::with_shop(ShopRecord::new(SHOP));

    let creds = MarketplaceCredentials {
        onboarded: true,
        access_token: Some("123.abc".to_string()),
        refresh_token: Some("123.ref".to_string()),
        ..Default::default()
    };
    store.save_marketplace_credentials(SHOP, &creds).await.unwrap();
    store.save_marketplace_shop(SHOP, 777, "Demo Shop").await.unwrap();

    let shop = store.get_shop(SHOP).await.unwrap();
    assert_eq!(shop.marketplace, creds);
    assert_eq!(shop.marketplace_shop_id, Some(777));

    // Debug output never shows token material.
    let dbg = format!("{shop:?}");
    assert!(!dbg.contains("123.abc"));
    assert!(dbg.contains("<REDACTED>"));

    let missing = store.get_shop("nope").await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}
