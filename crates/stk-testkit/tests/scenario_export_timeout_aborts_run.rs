//! Scenario: the primary bulk export never completes.
//!
//! # Invariants under test
//! - With 12 attempts at 20s the pass gives up after the 12th poll, inside
//!   the 240s ceiling.
//! - The run fails attributed to the primary-levels stage with a timeout.
//! - Nothing is written to either platform and the marketplace is never read.

use std::sync::Arc;

use stk_bulk::{BulkError, PollPolicy};
use stk_store::MemoryStore;
use stk_sync::{run_sync_once, Stage, SyncCause};
use stk_testkit::{harness, onboarded_shop, FakeMarketplace, FakePrimary, SHOP};
use tokio::time::{Duration, Instant};

#[tokio::test(start_paused = true)]
async fn stalled_export_times_out_before_any_write() {
    let store = Arc::new(MemoryStore::with_shop(onboarded_shop()));
    let primary = FakePrimary::new().with_item(1, 10, "MUG-RED");
    let marketplace = FakeMarketplace::new().with_product(100, 501, "MUG-RED", 10);
    let ctx = harness(store.clone(), &primary, &marketplace).with_poll_policy(PollPolicy::default());

    primary.stall_exports();
    let started = Instant::now();
    let err = run_sync_once(&ctx, SHOP).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.stage, Stage::PrimaryLevels);
    match &err.cause {
        SyncCause::Bulk(BulkError::Timeout { attempts, .. }) => assert_eq!(*attempts, 12),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(primary.status_calls(), 12);
    assert!(elapsed <= Duration::from_secs(240), "elapsed {elapsed:?}");
    assert!(elapsed >= Duration::from_secs(220), "elapsed {elapsed:?}");

    assert!(primary.writes().is_empty());
    assert!(marketplace.updates().is_empty());
    assert!(marketplace.tokens_seen().is_empty());
    assert!(store.records(SHOP).is_empty());
}
