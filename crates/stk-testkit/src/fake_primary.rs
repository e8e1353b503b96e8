//! In-process primary platform.
//!
//! Bulk jobs complete on the first status poll (unless stalled) and their
//! result is rendered from the current item table in the same NDJSON shape
//! the real export produces.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use stk_bulk::{
    BulkError, BulkExportApi, ExportKind, ExportQuery, JobStatus, LineSource, PendingExport,
    StaticLines,
};
use stk_primary::{LevelWrite, PrimaryApi, PrimaryConnector, PrimaryError};

use crate::{item_gid, location_gid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeItem {
    pub number: u64,
    pub location: u64,
    pub available: i64,
    pub sku: Option<String>,
    pub title: String,
    /// `false` for items whose stock the platform does not track.
    pub managed: bool,
}

#[derive(Default)]
struct State {
    items: BTreeMap<String, FakeItem>,
    extra_level_lines: Vec<String>,
    stalled: bool,
    fail_writes: BTreeSet<String>,
    writes: Vec<LevelWrite>,
    jobs: BTreeMap<String, ExportKind>,
    status_calls: u32,
    connected_with: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakePrimary {
    state: Arc<Mutex<State>>,
}

impl FakePrimary {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_item(self, number: u64, available: i64, sku: &str) -> Self {
        self.put_item(FakeItem {
            number,
            location: 1,
            available,
            sku: Some(sku.to_string()),
            title: format!("Product {number}"),
            managed: true,
        });
        self
    }

    pub fn put_item(&self, item: FakeItem) {
        self.state().items.insert(item_gid(item.number), item);
    }

    /// Simulate a sale or restock made directly on the platform.
    pub fn set_available(&self, number: u64, available: i64) {
        if let Some(item) = self.state().items.get_mut(&item_gid(number)) {
            item.available = available;
        }
    }

    pub fn available(&self, number: u64) -> Option<i64> {
        self.state().items.get(&item_gid(number)).map(|i| i.available)
    }

    /// Raw line placed at the top of every inventory-levels export.
    pub fn inject_level_line(&self, line: &str) {
        self.state().extra_level_lines.push(line.to_string());
    }

    /// Jobs never leave RUNNING.
    pub fn stall_exports(&self) {
        self.state().stalled = true;
    }

    pub fn fail_writes_for(&self, number: u64) {
        self.state().fail_writes.insert(item_gid(number));
    }

    pub fn writes(&self) -> Vec<LevelWrite> {
        self.state().writes.clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.state().status_calls
    }

    pub fn connected_with(&self) -> Vec<String> {
        self.state().connected_with.clone()
    }

    fn render(&self, kind: ExportKind) -> Vec<String> {
        let st = self.state();
        let mut lines = Vec::new();
        match kind {
            ExportKind::InventoryLevels => {
                lines.extend(st.extra_level_lines.iter().cloned());
                for (gid, item) in &st.items {
                    lines.push(json!({ "id": gid }).to_string());
                    lines.push(
                        json!({
                            "location": { "id": location_gid(item.location) },
                            "available": item.available,
                            "__parentId": gid,
                        })
                        .to_string(),
                    );
                }
            }
            ExportKind::ProductVariants => {
                for (gid, item) in &st.items {
                    let product_id = format!("gid://shopify/Product/{}", item.number);
                    lines.push(json!({ "id": product_id, "title": item.title }).to_string());
                    lines.push(
                        json!({
                            "id": format!("gid://shopify/ProductVariant/{}", item.number),
                            "displayName": format!("{} - Default Title", item.title),
                            "inventoryManagement": if item.managed { "SHOPIFY" } else { "NOT_MANAGED" },
                            "inventoryItem": { "id": gid },
                            "sku": item.sku,
                            "product": { "id": product_id, "title": item.title },
                            "__parentId": product_id,
                        })
                        .to_string(),
                    );
                }
            }
        }
        lines
    }
}

#[async_trait]
impl BulkExportApi for FakePrimary {
    async fn submit(&self, query: &ExportQuery) -> Result<PendingExport, BulkError> {
        let mut st = self.state();
        let id = format!("gid://shopify/BulkOperation/{}", st.jobs.len() + 1);
        st.jobs.insert(id.clone(), query.kind);
        Ok(PendingExport::new(id, JobStatus::Created))
    }

    async fn status(&self, job_id: &str) -> Result<PendingExport, BulkError> {
        let mut st = self.state();
        st.status_calls += 1;
        if st.stalled {
            return Ok(PendingExport::new(job_id, JobStatus::Running));
        }
        let mut job = PendingExport::new(job_id, JobStatus::Completed);
        job.result_url = Some(format!("fake://exports/{job_id}"));
        job.object_count = Some(st.items.len() as u64 * 2);
        Ok(job)
    }
}

#[async_trait]
impl PrimaryApi for FakePrimary {
    async fn open_export(&self, url: &str) -> Result<Box<dyn LineSource>, BulkError> {
        let job_id = url.trim_start_matches("fake://exports/");
        let kind = self
            .state()
            .jobs
            .get(job_id)
            .copied()
            .ok_or_else(|| BulkError::Transport(format!("unknown export {url}")))?;
        Ok(Box::new(StaticLines::new(self.render(kind))))
    }

    async fn set_available(&self, write: &LevelWrite) -> Result<(), PrimaryError> {
        let mut st = self.state();
        if st.fail_writes.contains(&write.inventory_item_id) {
            return Err(PrimaryError::Api {
                status: 422,
                body: "{\"errors\":\"inventory item not stocked at location\"}".to_string(),
            });
        }
        if let Some(item) = st.items.get_mut(&write.inventory_item_id) {
            item.available = write.available;
        }
        st.writes.push(write.clone());
        Ok(())
    }
}

impl PrimaryConnector for FakePrimary {
    fn connect(&self, _shop: &str, access_token: &str) -> Result<Arc<dyn PrimaryApi>, PrimaryError> {
        self.state().connected_with.push(access_token.to_string());
        Ok(Arc::new(self.clone()))
    }
}
