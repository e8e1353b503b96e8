use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use stk_bulk::{BulkError, BulkExportApi, ExportQuery, JobStatus, LineSource, PendingExport};
use tracing::{debug, info, warn};

use crate::lines::ResultLines;
use crate::queries::{RUN_QUERY_MUTATION, STATUS_QUERY};
use crate::{numeric_id, LevelWrite, PrimaryApi, PrimaryError};

pub const DEFAULT_API_VERSION: &str = "2021-01";

const TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Clone)]
pub struct PrimaryClientConfig {
    /// Shop domain, e.g. `demo.myshopify.com`.
    pub shop: String,
    pub access_token: String,
    pub api_version: String,
    pub base_url: Option<String>,
}

/// Reqwest-backed primary platform client for one shop.
#[derive(Clone)]
pub struct PrimaryClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    access_token: String,
}

impl std::fmt::Debug for PrimaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl PrimaryClient {
    pub fn new(cfg: PrimaryClientConfig) -> Result<Self, PrimaryError> {
        if cfg.shop.trim().is_empty() && cfg.base_url.is_none() {
            return Err(PrimaryError::Config("shop domain is empty".to_string()));
        }
        let base_url = cfg
            .base_url
            .unwrap_or_else(|| format!("https://{}", cfg.shop.trim()));

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: cfg.api_version,
            access_token: cfg.access_token,
        })
    }

    fn graphql_url(&self) -> String {
        format!("{}/admin/api/{}/graphql.json", self.base_url, self.api_version)
    }

    fn set_level_url(&self) -> String {
        format!(
            "{}/admin/api/{}/inventory_levels/set.json",
            self.base_url, self.api_version
        )
    }

    async fn graphql<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, PrimaryError> {
        let resp = self
            .http
            .post(self.graphql_url())
            .header(TOKEN_HEADER, &self.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PrimaryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GraphqlEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| PrimaryError::Decode(e.to_string()))?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let msg = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PrimaryError::Graphql(msg));
        }

        envelope
            .data
            .ok_or_else(|| PrimaryError::Decode("graphql response without data".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryData {
    bulk_operation_run_query: Option<RunQueryPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryPayload {
    bulk_operation: Option<BulkOperationNode>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    node: Option<BulkOperationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkOperationNode {
    id: String,
    status: String,
    #[serde(default)]
    error_code: Option<String>,
    // Serialized as a string by the platform (unsigned 64-bit).
    #[serde(default)]
    object_count: Option<Value>,
    #[serde(default)]
    url: Option<String>,
}

/// Map a platform status onto the four-state job model.
fn job_status(raw: &str) -> JobStatus {
    match raw {
        "CREATED" => JobStatus::Created,
        "RUNNING" => JobStatus::Running,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" | "CANCELING" | "CANCELED" | "EXPIRED" => JobStatus::Failed,
        other => {
            warn!(status = other, "unknown bulk operation status; treating as running");
            JobStatus::Running
        }
    }
}

fn object_count(v: &Option<Value>) -> Option<u64> {
    match v {
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
}

impl From<BulkOperationNode> for PendingExport {
    fn from(n: BulkOperationNode) -> Self {
        let status = job_status(&n.status);
        PendingExport {
            object_count: object_count(&n.object_count),
            id: n.id,
            status,
            raw_status: n.status,
            result_url: n.url.filter(|u| !u.is_empty()),
            error_code: n.error_code,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl BulkExportApi for PrimaryClient {
    async fn submit(&self, query: &ExportQuery) -> Result<PendingExport, BulkError> {
        let data: RunQueryData = self
            .graphql(RUN_QUERY_MUTATION, json!({ "query": query.document }))
            .await?;

        let payload = data
            .bulk_operation_run_query
            .ok_or_else(|| BulkError::Decode("missing bulkOperationRunQuery".to_string()))?;

        if !payload.user_errors.is_empty() {
            let msg = payload
                .user_errors
                .iter()
                .map(|e| match &e.field {
                    Some(f) if !f.is_empty() => format!("{}: {}", f.join("."), e.message),
                    _ => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BulkError::SubmitRejected(msg));
        }

        match payload.bulk_operation {
            Some(op) if op.status == "CREATED" => Ok(op.into()),
            Some(op) => Err(BulkError::SubmitRejected(format!(
                "bulk operation {} returned status {}",
                op.id, op.status
            ))),
            None => Err(BulkError::SubmitRejected(
                "no bulk operation returned".to_string(),
            )),
        }
    }

    async fn status(&self, job_id: &str) -> Result<PendingExport, BulkError> {
        let data: StatusData = self.graphql(STATUS_QUERY, json!({ "id": job_id })).await?;
        let node = data
            .node
            .ok_or_else(|| BulkError::Decode(format!("bulk operation {job_id} not found")))?;
        debug!(job_id, status = %node.status, "bulk operation status");
        Ok(node.into())
    }
}

#[async_trait]
impl PrimaryApi for PrimaryClient {
    async fn open_export(&self, url: &str) -> Result<Box<dyn LineSource>, BulkError> {
        // Result URLs are pre-signed; no platform auth header.
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BulkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BulkError::Transport(format!(
                "export download failed status={}",
                status.as_u16()
            )));
        }
        Ok(Box::new(ResultLines::new(resp)))
    }

    async fn set_available(&self, write: &LevelWrite) -> Result<(), PrimaryError> {
        let form = [
            ("location_id", numeric_id(&write.location_id).to_string()),
            ("inventory_item_id", numeric_id(&write.inventory_item_id).to_string()),
            ("available", write.available.to_string()),
        ];

        let resp = self
            .http
            .post(self.set_level_url())
            .header(TOKEN_HEADER, &self.access_token)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PrimaryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            inventory_item_id = %write.inventory_item_id,
            location_id = %write.location_id,
            available = write.available,
            "primary stock level set"
        );
        Ok(())
    }
}
