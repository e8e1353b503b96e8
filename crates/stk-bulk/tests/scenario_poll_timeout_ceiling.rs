//! Scenario: a bulk export that never completes.
//!
//! # Invariants under test
//! - With the default policy (12 attempts, 20s interval) the poller gives up
//!   with `Timeout` after the 12th status poll.
//! - Total suspended time stays within the 4-minute ceiling.
//! - No result location is ever returned for an unfinished job.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use stk_bulk::{
    BulkError, BulkExportApi, BulkJobPoller, ExportKind, ExportQuery, JobStatus, PendingExport,
    PollPolicy,
};

struct NeverReady {
    polls: AtomicU32,
}

#[async_trait]
impl BulkExportApi for NeverReady {
    async fn submit(&self, _query: &ExportQuery) -> Result<PendingExport, BulkError> {
        Ok(PendingExport::new("gid://shopify/BulkOperation/9", JobStatus::Created))
    }

    async fn status(&self, job_id: &str) -> Result<PendingExport, BulkError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut p = PendingExport::new(job_id, JobStatus::Running);
        // A partial URL on a running job must never be handed out.
        p.result_url = Some("https://results/partial.jsonl".to_string());
        Ok(p)
    }
}

#[tokio::test(start_paused = true)]
async fn never_completing_job_times_out_after_twelfth_poll() {
    let api = NeverReady {
        polls: AtomicU32::new(0),
    };
    let poller = BulkJobPoller::new(&api, PollPolicy::default());
    let query = ExportQuery {
        kind: ExportKind::ProductVariants,
        document: "{ products { edges { node { id } } } }".to_string(),
    };

    let started = tokio::time::Instant::now();
    let err = poller.run(&query).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        BulkError::Timeout {
            job_id, attempts, ..
        } => {
            assert_eq!(job_id, "gid://shopify/BulkOperation/9");
            assert_eq!(attempts, 12);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(api.polls.load(Ordering::SeqCst), 12);

    // 11 back-off sleeps between 12 polls.
    let ceiling = PollPolicy::default().ceiling();
    assert!(elapsed.as_secs() >= 220, "elapsed {elapsed:?}");
    assert!(elapsed <= ceiling, "elapsed {elapsed:?} exceeds {ceiling:?}");
}
