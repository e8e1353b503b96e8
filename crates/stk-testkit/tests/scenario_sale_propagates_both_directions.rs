//! Scenario: a sale on one platform is propagated to the other.
//!
//! # Invariants under test
//! - A change observed on the primary side adjusts the marketplace, and a
//!   change observed on the marketplace adjusts the primary side.
//! - The written quantity is `max(0, counterpart.current + delta)`.
//! - A run with no real-world change after a stabilizing run writes nothing.
//! - Products of a listing not being changed keep their quantity.

use std::sync::Arc;

use stk_store::{MemoryStore, StockRecordStore};
use stk_sync::run_sync_once;
use stk_testkit::{harness, item_gid, item_key, onboarded_shop, FakeMarketplace, FakePrimary, SHOP};

#[tokio::test]
async fn sales_flow_both_ways_and_settle() {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new().with_item(1, 10, "MUG-RED").with_item(2, 5, "CUP");
    let marketplace = FakeMarketplace::new()
        .with_product(100, 501, "MUG-RED", 10)
        .with_product(100, 502, "CUP", 5);
    let ctx = harness(store.clone(), &primary, &marketplace);

    run_sync_once(&ctx, SHOP).await.unwrap();

    // Three mugs sold in the primary shop.
    primary.set_available(1, 7);
    let run = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(run.reconcile.changed, 1);
    assert_eq!(run.apply_marketplace.applied, 1);
    assert_eq!(run.apply_primary.attempted, 0);
    assert_eq!(marketplace.quantity(501), Some(7));
    assert_eq!(marketplace.quantity(502), Some(5));

    let updates = marketplace.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 100);
    let quantities: Vec<i64> = updates[0].1.products.iter().map(|p| p.offerings[0].quantity).collect();
    assert_eq!(quantities, vec![7, 5]);

    let mug = store.get(SHOP, &item_key(1)).await.unwrap().unwrap();
    assert_eq!((mug.marketplace.previous, mug.marketplace.current), (7, 7));
    assert_eq!((mug.primary.previous, mug.primary.current), (7, 7));

    // Nothing changed: nothing written.
    let idle = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(idle.reconcile.changed, 0);
    assert_eq!(marketplace.updates().len(), 1);
    assert!(primary.writes().is_empty());

    // Two cups sold on the marketplace.
    marketplace.set_quantity(502, 3);
    let run = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(run.apply_primary.applied, 1);
    let writes = primary.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].inventory_item_id, item_gid(2));
    assert_eq!(writes[0].available, 3);
    assert_eq!(primary.available(2), Some(3));

    let idle = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(idle.reconcile.changed, 0);
    assert_eq!(primary.writes().len(), 1);
    assert_eq!(marketplace.updates().len(), 1);
}

#[tokio::test]
async fn oversold_marketplace_is_clamped_to_zero() {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new().with_item(1, 10, "MUG-RED");
    let marketplace = FakeMarketplace::new().with_product(100, 501, "MUG-RED", 2);
    let ctx = harness(store.clone(), &primary, &marketplace);

    run_sync_once(&ctx, SHOP).await.unwrap();

    // Bulk sale of 8 on the primary side; the marketplace only had 2.
    primary.set_available(1, 2);
    run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(marketplace.quantity(501), Some(0));
}
