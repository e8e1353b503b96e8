//! Primary platform snapshot: one bulk export, streamed into the store.

use serde::Serialize;
use stk_bulk::{
    BulkJobPoller, ExportKind, IngestStats, LineSource, PollPolicy, PrimaryUpdate,
    SnapshotIngester, StaticLines,
};
use stk_primary::{queries, PrimaryApi};
use stk_reconcile::{ObservedKeys, Platform};
use stk_store::StockRecordStore;
use tracing::{info, warn};

use crate::{Stage, SyncError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrimaryPassStats {
    pub ingest: IngestStats,
    pub object_count: Option<u64>,
    /// Accepted updates the store failed to merge.
    pub store_errors: u64,
}

/// Run the `kind` export to completion and merge every accepted line.
///
/// Inventory-level lines mark their key as observed on the primary side.
/// Export failures and a broken result stream abort the pass; a single
/// unparseable line or failed merge does not.
pub async fn ingest_primary_export<S: StockRecordStore + ?Sized>(
    api: &dyn PrimaryApi,
    poll: PollPolicy,
    store: &S,
    shop: &str,
    kind: ExportKind,
    observed: &mut ObservedKeys,
) -> Result<PrimaryPassStats, SyncError> {
    let stage = match kind {
        ExportKind::InventoryLevels => Stage::PrimaryLevels,
        ExportKind::ProductVariants => Stage::PrimaryVariants,
    };
    let query = queries::for_kind(kind);

    let ready = BulkJobPoller::new(api, poll)
        .run(&query)
        .await
        .map_err(|e| SyncError::new(stage, e))?;

    let mut source: Box<dyn LineSource> = match ready.url.as_deref() {
        Some(url) => api.open_export(url).await.map_err(|e| SyncError::new(stage, e))?,
        None => {
            info!(shop, job_id = %ready.job_id, kind = kind.as_str(), "export completed empty");
            Box::new(StaticLines::empty())
        }
    };

    let mut ingester = SnapshotIngester::new(kind);
    let mut stats = PrimaryPassStats {
        object_count: ready.object_count,
        ..Default::default()
    };

    while let Some(update) = ingester
        .next_update(source.as_mut())
        .await
        .map_err(|e| SyncError::new(stage, e))?
    {
        let key = update.key();
        match store.upsert_merge(shop, &key, &update.to_patch()).await {
            Ok(_) => {
                if matches!(update, PrimaryUpdate::Level { .. }) {
                    observed.mark(Platform::Primary, key);
                }
            }
            Err(e) => {
                stats.store_errors += 1;
                warn!(shop, %key, error = %e, "primary update merge failed; skipping");
            }
        }
    }

    stats.ingest = ingester.stats();
    info!(
        shop,
        stage = %stage,
        job_id = %ready.job_id,
        lines = stats.ingest.lines,
        accepted = stats.ingest.accepted,
        malformed = stats.ingest.malformed,
        filtered = stats.ingest.filtered,
        store_errors = stats.store_errors,
        "primary export ingested"
    );
    Ok(stats)
}
