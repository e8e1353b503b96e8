//! Submit-then-poll driver for bulk exports.
//!
//! One submission, then up to `max_attempts` status polls separated by
//! `interval`. The caller's task is suspended between polls (tokio sleep);
//! there is no busy-waiting and no resubmission once a job exists.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{BulkError, BulkExportApi, ExportQuery, JobStatus, PendingExport};

/// Attempt budget for one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Upper bound on time spent polling one job.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(12, Duration::from_secs(20))
    }
}

/// A completed export ready for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyExport {
    pub job_id: String,
    /// `None` when the job completed without producing any object.
    pub url: Option<String>,
    pub object_count: Option<u64>,
}

pub struct BulkJobPoller<'a, A: BulkExportApi + ?Sized> {
    api: &'a A,
    policy: PollPolicy,
}

impl<'a, A: BulkExportApi + ?Sized> BulkJobPoller<'a, A> {
    pub fn new(api: &'a A, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Submit `query` once and return the job id.
    pub async fn submit(&self, query: &ExportQuery) -> Result<String, BulkError> {
        let job = self.api.submit(query).await?;
        match job.status {
            JobStatus::Failed => Err(BulkError::SubmitRejected(format!(
                "job {} created in status {}",
                job.id, job.raw_status
            ))),
            _ => {
                info!(job_id = %job.id, kind = query.kind.as_str(), "bulk export submitted");
                Ok(job.id)
            }
        }
    }

    /// Poll `job_id` until it completes, fails, or the attempt budget is spent.
    ///
    /// Transport and decode errors during a poll consume an attempt but do not
    /// end the loop; the last one is reported if the budget runs out.
    pub async fn poll_until_ready(&self, job_id: &str) -> Result<ReadyExport, BulkError> {
        let mut last_error: Option<String> = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.api.status(job_id).await {
                Ok(job) if job.id != job_id => {
                    // The platform answered about a different operation.
                    warn!(job_id, reported = %job.id, attempt, "bulk status reported for another job");
                    last_error = Some(format!("status reported for job {}", job.id));
                }
                Ok(job) => match job.status {
                    JobStatus::Completed => {
                        info!(
                            job_id,
                            attempt,
                            objects = job.object_count.unwrap_or(0),
                            "bulk export ready"
                        );
                        return Ok(ready(job));
                    }
                    JobStatus::Failed => {
                        let diagnostic = job
                            .error_code
                            .clone()
                            .unwrap_or_else(|| "no diagnostic supplied".to_string());
                        warn!(job_id, status = %job.raw_status, %diagnostic, "bulk export failed");
                        return Err(BulkError::PlatformError {
                            job_id: job_id.to_string(),
                            status: job.raw_status,
                            diagnostic,
                        });
                    }
                    JobStatus::Created | JobStatus::Running => {
                        debug!(job_id, attempt, status = %job.raw_status, "bulk export pending");
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(job_id, attempt, error = %e, "bulk status poll failed");
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            if attempt >= self.policy.max_attempts {
                warn!(job_id, attempts = attempt, "bulk export poll budget exhausted");
                return Err(BulkError::Timeout {
                    job_id: job_id.to_string(),
                    attempts: attempt,
                    last_error,
                });
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }

    /// Submit then poll.
    pub async fn run(&self, query: &ExportQuery) -> Result<ReadyExport, BulkError> {
        let job_id = self.submit(query).await?;
        self.poll_until_ready(&job_id).await
    }
}

fn ready(job: PendingExport) -> ReadyExport {
    ReadyExport {
        job_id: job.id,
        url: job.result_url,
        object_count: job.object_count,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExportKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted status responses; repeats the last one when exhausted.
    struct Scripted {
        submit: Result<PendingExport, BulkError>,
        statuses: Mutex<VecDeque<Result<PendingExport, BulkError>>>,
        polls: Mutex<u32>,
    }

    impl Scripted {
        fn new(statuses: Vec<Result<PendingExport, BulkError>>) -> Self {
            Self {
                submit: Ok(PendingExport::new("job-1", JobStatus::Created)),
                statuses: Mutex::new(statuses.into()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl BulkExportApi for Scripted {
        async fn submit(&self, _query: &ExportQuery) -> Result<PendingExport, BulkError> {
            self.submit.clone()
        }

        async fn status(&self, _job_id: &str) -> Result<PendingExport, BulkError> {
            *self.polls.lock().unwrap() += 1;
            let mut q = self.statuses.lock().unwrap();
            if q.len() > 1 {
                q.pop_front().unwrap()
            } else {
                q.front().cloned().unwrap()
            }
        }
    }

    fn query() -> ExportQuery {
        ExportQuery {
            kind: ExportKind::InventoryLevels,
            document: "{}".to_string(),
        }
    }

    fn running() -> Result<PendingExport, BulkError> {
        Ok(PendingExport::new("job-1", JobStatus::Running))
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_third_poll() {
        let mut done = PendingExport::new("job-1", JobStatus::Completed);
        done.result_url = Some("https://results/1.jsonl".to_string());
        done.object_count = Some(3);
        let api = Scripted::new(vec![running(), running(), Ok(done)]);

        let poller = BulkJobPoller::new(&api, PollPolicy::default());
        let ready = poller.run(&query()).await.unwrap();

        assert_eq!(ready.url.as_deref(), Some("https://results/1.jsonl"));
        assert_eq!(ready.object_count, Some(3));
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_returns_platform_error_immediately() {
        let mut failed = PendingExport::new("job-1", JobStatus::Failed);
        failed.raw_status = "EXPIRED".to_string();
        failed.error_code = Some("TIMEOUT".to_string());
        let api = Scripted::new(vec![running(), Ok(failed)]);

        let err = BulkJobPoller::new(&api, PollPolicy::default())
            .poll_until_ready("job-1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BulkError::PlatformError {
                job_id: "job-1".to_string(),
                status: "EXPIRED".to_string(),
                diagnostic: "TIMEOUT".to_string(),
            }
        );
        assert_eq!(api.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_spend_attempts_then_time_out() {
        let api = Scripted::new(vec![Err(BulkError::Transport("connection reset".to_string()))]);
        let policy = PollPolicy::new(3, Duration::from_secs(5));

        let err = BulkJobPoller::new(&api, policy)
            .poll_until_ready("job-1")
            .await
            .unwrap_err();

        match err {
            BulkError::Timeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap().contains("connection reset"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn status_for_other_job_is_not_accepted() {
        let mut other = PendingExport::new("job-0", JobStatus::Completed);
        other.result_url = Some("https://results/stale.jsonl".to_string());
        let api = Scripted::new(vec![Ok(other)]);

        let err = BulkJobPoller::new(&api, PollPolicy::new(2, Duration::from_secs(1)))
            .poll_until_ready("job-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Timeout { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submit_is_not_polled() {
        let mut api = Scripted::new(vec![running()]);
        api.submit = Err(BulkError::SubmitRejected("A bulk query operation is already in progress".to_string()));

        let err = BulkJobPoller::new(&api, PollPolicy::default())
            .run(&query())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::SubmitRejected(_)));
        assert_eq!(api.polls(), 0);
    }

    #[test]
    fn default_policy_ceiling_is_four_minutes() {
        let p = PollPolicy::default();
        assert_eq!(p.max_attempts, 12);
        assert_eq!(p.ceiling(), Duration::from_secs(240));
        assert_eq!(PollPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }
}
