//! stk-bulk
//!
//! Asynchronous bulk-export protocol for platforms that cannot return a full
//! inventory synchronously: submit an export, poll it until it is ready, then
//! stream the newline-delimited result through a [`SnapshotIngester`].
//!
//! This crate owns the protocol and the line classification only. The HTTP
//! calls live behind [`BulkExportApi`] / [`LineSource`] and are implemented
//! by the platform client crates.

pub mod ingest;
pub mod poller;

pub use ingest::{IngestStats, LineSource, PrimaryUpdate, SnapshotIngester, StaticLines};
pub use poller::{BulkJobPoller, PollPolicy, ReadyExport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A submitted bulk job as last reported by the platform. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExport {
    pub id: String,
    pub status: JobStatus,
    /// Status string exactly as the platform sent it.
    pub raw_status: String,
    /// Present only once `status == Completed` (and absent for an empty export).
    pub result_url: Option<String>,
    pub error_code: Option<String>,
    pub object_count: Option<u64>,
}

impl PendingExport {
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            raw_status: status.as_str().to_string(),
            result_url: None,
            error_code: None,
            object_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// The two snapshot shapes the primary platform exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Inventory items with their per-location available quantity.
    InventoryLevels,
    /// Product variants with sku, parent product and inventory-management flag.
    ProductVariants,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::InventoryLevels => "inventory_levels",
            ExportKind::ProductVariants => "product_variants",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportQuery {
    pub kind: ExportKind,
    /// Platform query document submitted verbatim.
    pub document: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkError {
    /// The platform refused to create the job. Safe to resubmit.
    #[error("bulk export submit rejected: {0}")]
    SubmitRejected(String),

    /// The job did not complete within the attempt budget.
    #[error("bulk export {job_id} not ready after {attempts} polls")]
    Timeout {
        job_id: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("bulk export {job_id} failed with status {status}: {diagnostic}")]
    PlatformError {
        job_id: String,
        status: String,
        diagnostic: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl BulkError {
    /// Errors the poll loop absorbs as a spent attempt instead of failing.
    pub fn is_transient(&self) -> bool {
        matches!(self, BulkError::Transport(_) | BulkError::Decode(_))
    }
}

// ---------------------------------------------------------------------------
// Platform boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BulkExportApi: Send + Sync {
    /// Submit `query`. Returns the created job or `SubmitRejected`.
    async fn submit(&self, query: &ExportQuery) -> Result<PendingExport, BulkError>;

    /// Current state of job `job_id`.
    async fn status(&self, job_id: &str) -> Result<PendingExport, BulkError>;
}
