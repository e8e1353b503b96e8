//! Scenario: operator override.
//!
//! # Invariants under test
//! - An override value, not the computed delta, is what gets applied.
//! - It is applied once to each platform where the key is initialized, and
//!   both baselines are reset to it.
//! - The override request is cleared once applied, so the next run is quiet.
//! - One platform rejecting a forced write does not stop the others.

use std::sync::Arc;

use stk_store::{MemoryStore, StockRecordPatch, StockRecordStore};
use stk_sync::run_sync_once;
use stk_testkit::{harness, item_key, onboarded_shop, FakeMarketplace, FakePrimary, SHOP};

async fn request_override(store: &MemoryStore, number: u64, value: i64) {
    store
        .upsert_merge(
            SHOP,
            &item_key(number),
            &StockRecordPatch {
                override_requested: Some(true),
                override_value: Some(value),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn override_beats_delta_and_is_cleared() {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new().with_item(2, 10, "VASE");
    let marketplace = FakeMarketplace::new().with_product(200, 601, "VASE", 10);
    let ctx = harness(store.clone(), &primary, &marketplace);
    run_sync_once(&ctx, SHOP).await.unwrap();

    // A sale of 5 on the primary side and a restock instruction of 50.
    primary.set_available(2, 5);
    request_override(&store, 2, 50).await;

    let run = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(run.overrides.quantities, 1);
    assert_eq!(run.reconcile.overrides, 1);
    assert_eq!(run.reconcile.changed, 0);
    assert_eq!(run.apply_primary.forced, 1);
    assert_eq!(run.apply_marketplace.forced, 1);

    let writes = primary.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].available, 50);
    assert_eq!(marketplace.quantity(601), Some(50));

    let rec = store.get(SHOP, &item_key(2)).await.unwrap().unwrap();
    assert!(!rec.override_requested);
    assert_eq!((rec.primary.previous, rec.primary.current), (50, 50));
    assert_eq!((rec.marketplace.previous, rec.marketplace.current), (50, 50));

    let quiet = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(quiet.overrides.quantities, 0);
    assert_eq!(quiet.reconcile.changed, 0);
    assert_eq!(primary.writes().len(), 1);
    assert_eq!(marketplace.updates().len(), 1);
}

#[tokio::test]
async fn failed_override_write_is_tolerated() {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new().with_item(2, 10, "VASE").with_item(3, 1, "BOWL");
    let marketplace = FakeMarketplace::new()
        .with_product(200, 601, "VASE", 10)
        .with_product(300, 701, "BOWL", 1);
    let ctx = harness(store.clone(), &primary, &marketplace);
    run_sync_once(&ctx, SHOP).await.unwrap();

    marketplace.fail_updates_for(200);
    request_override(&store, 2, 20).await;
    request_override(&store, 3, 9).await;

    let run = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(run.apply_primary.applied, 2);
    assert_eq!(run.apply_marketplace.attempted, 2);
    assert_eq!(run.apply_marketplace.failed, 1);
    assert_eq!(marketplace.quantity(601), Some(10));
    assert_eq!(marketplace.quantity(701), Some(9));

    // The baseline follows the attempted value even where the write failed.
    let vase = store.get(SHOP, &item_key(2)).await.unwrap().unwrap();
    assert_eq!((vase.marketplace.previous, vase.marketplace.current), (20, 20));
    assert!(!vase.override_requested);
}
