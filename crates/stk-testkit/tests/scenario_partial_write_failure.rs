//! Scenario: write-back failures.
//!
//! # Invariants under test
//! - One rejected write does not stop the rest of the batch and does not
//!   fail the run.
//! - When every attempted write to a platform fails the run reports a
//!   systemic failure for that stage, after the other platform was written.

use std::sync::Arc;

use stk_reconcile::Platform;
use stk_store::{MemoryStore, StockRecordStore};
use stk_sync::{run_sync_once, Stage, SyncCause};
use stk_testkit::{harness, item_key, onboarded_shop, FakeMarketplace, FakePrimary, SHOP};

fn setup() -> (Arc<MemoryStore>, FakePrimary, FakeMarketplace) {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new()
        .with_item(1, 10, "A")
        .with_item(2, 10, "B")
        .with_item(3, 10, "C");
    let marketplace = FakeMarketplace::new()
        .with_product(100, 501, "A", 10)
        .with_product(100, 502, "B", 10)
        .with_product(300, 503, "C", 10);
    (store, primary, marketplace)
}

#[tokio::test]
async fn one_rejected_item_is_tolerated() {
    let (store, primary, marketplace) = setup();
    let ctx = harness(store.clone(), &primary, &marketplace);
    run_sync_once(&ctx, SHOP).await.unwrap();

    marketplace.set_quantity(501, 8);
    marketplace.set_quantity(502, 6);
    primary.fail_writes_for(1);

    let run = run_sync_once(&ctx, SHOP).await.unwrap();
    assert_eq!(run.apply_primary.attempted, 2);
    assert_eq!(run.apply_primary.applied, 1);
    assert_eq!(run.apply_primary.failed, 1);
    assert_eq!(primary.available(1), Some(10));
    assert_eq!(primary.available(2), Some(6));

    // The failed item's baseline still moved to the attempted value.
    let a = store.get(SHOP, &item_key(1)).await.unwrap().unwrap();
    assert_eq!((a.primary.previous, a.primary.current), (8, 8));
}

#[tokio::test]
async fn all_writes_failing_is_systemic() {
    let (store, primary, marketplace) = setup();
    let ctx = harness(store.clone(), &primary, &marketplace);
    run_sync_once(&ctx, SHOP).await.unwrap();

    marketplace.set_quantity(501, 8);
    marketplace.set_quantity(502, 6);
    primary.fail_writes_for(1);
    primary.fail_writes_for(2);
    // A sale on the primary side still has to reach the marketplace.
    primary.set_available(3, 7);

    let err = run_sync_once(&ctx, SHOP).await.unwrap_err();
    assert_eq!(err.stage, Stage::ApplyPrimary);
    match err.cause {
        SyncCause::Systemic { platform, attempted } => {
            assert_eq!(platform, Platform::Primary);
            assert_eq!(attempted, 2);
        }
        other => panic!("expected systemic failure, got {other:?}"),
    }
    assert_eq!(marketplace.quantity(503), Some(7));
}
