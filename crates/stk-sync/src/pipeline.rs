use std::collections::BTreeMap;

use stk_bulk::ExportKind;
use stk_reconcile::{
    ApplySummary, DeltaReconciler, ObservedKeys, OverrideResolver, OverrideSet, PartialFailure,
    Platform, StockMutator,
};
use stk_store::ShopStore;
use tracing::{info, warn};

use crate::auth::{marketplace_access_token, primary_api};
use crate::marketplace_pass::ingest_marketplace;
use crate::primary_pass::ingest_primary_export;
use crate::writers::{MarketplaceWriter, PrimaryWriter};
use crate::{RunSummary, Stage, SyncCause, SyncContext, SyncError};

/// Run the whole pipeline once for `shop`.
///
/// Both snapshots are fully ingested before anything is written. Both
/// platforms are written before a systemic write failure is reported, since
/// reconciliation has already moved the source baselines.
pub async fn run_sync_once(ctx: &SyncContext, shop: &str) -> Result<RunSummary, SyncError> {
    let store = ctx.store.as_ref();
    let mut summary = RunSummary::new(shop);
    info!(shop, "sync run starting");

    // Overrides
    let overrides = match OverrideResolver::new(store, shop).load().await {
        Ok(set) => set,
        Err(e) => {
            warn!(shop, stage = %Stage::Overrides, error = %e, "overrides unavailable; continuing without them");
            summary.overrides.load_failed = true;
            OverrideSet::default()
        }
    };
    summary.overrides.quantities = overrides.quantities.len() as u64;
    summary.overrides.links = overrides.links.len() as u64;

    let shop_record = store
        .get_shop(shop)
        .await
        .map_err(|e| SyncError::new(Stage::PrimaryAuth, e))?;

    // Primary snapshot
    let primary = primary_api(ctx, &shop_record)?;
    let mut observed = ObservedKeys::default();
    summary.primary_levels = ingest_primary_export(
        primary.as_ref(),
        ctx.poll,
        store,
        shop,
        ExportKind::InventoryLevels,
        &mut observed,
    )
    .await?;
    summary.primary_variants = ingest_primary_export(
        primary.as_ref(),
        ctx.poll,
        store,
        shop,
        ExportKind::ProductVariants,
        &mut observed,
    )
    .await?;

    // Marketplace snapshot
    let token = marketplace_access_token(ctx, &shop_record).await?;
    let (mstats, listings) =
        ingest_marketplace(ctx, &shop_record, &token, &overrides.links, &mut observed).await?;
    summary.marketplace = mstats;

    // Reconcile
    let report = DeltaReconciler::new(store, shop).reconcile(&observed, &overrides).await;
    summary.reconcile = report.stats;
    info!(
        shop,
        stage = %Stage::Reconcile,
        to_primary = report.delta.primary.len(),
        to_marketplace = report.delta.marketplace.len(),
        forced_primary = report.overrides.primary.len(),
        forced_marketplace = report.overrides.marketplace.len(),
        "deltas computed"
    );

    // Apply
    let mutator = StockMutator::new(store, shop);

    let primary_writer = PrimaryWriter::new(primary.as_ref());
    summary.apply_primary = settle(
        Stage::ApplyPrimary,
        mutator
            .apply_deltas(&primary_writer, &report.delta.primary, &report.overrides.primary)
            .await,
    );

    let marketplace_writer =
        MarketplaceWriter::new(ctx.marketplace.as_ref(), &token, &overrides.links, listings);
    summary.apply_marketplace = settle(
        Stage::ApplyMarketplace,
        mutator
            .apply_deltas(
                &marketplace_writer,
                &report.delta.marketplace,
                &report.overrides.marketplace,
            )
            .await,
    );
    let (relinked, link_failures) = marketplace_writer.write_pending_links().await;
    summary.relinked_listings = relinked;
    if !link_failures.is_empty() {
        warn!(shop, failed = link_failures.len(), "some sku links were not written");
    }

    for (stage, platform, applied) in [
        (Stage::ApplyPrimary, Platform::Primary, &summary.apply_primary),
        (Stage::ApplyMarketplace, Platform::Marketplace, &summary.apply_marketplace),
    ] {
        if applied.is_systemic_failure() {
            return Err(SyncError::new(
                stage,
                SyncCause::Systemic {
                    platform,
                    attempted: applied.attempted,
                },
            ));
        }
    }

    info!(
        shop,
        primary_applied = summary.apply_primary.applied,
        primary_failed = summary.apply_primary.failed,
        marketplace_applied = summary.apply_marketplace.applied,
        marketplace_failed = summary.apply_marketplace.failed,
        relinked = summary.relinked_listings,
        "sync run complete"
    );
    Ok(summary)
}

/// Tolerated per-item failures are logged and folded into the summary.
fn settle(stage: Stage, res: Result<ApplySummary, PartialFailure>) -> ApplySummary {
    match res {
        Ok(s) => s,
        Err(pf) => {
            let preview: BTreeMap<String, String> = pf
                .failures
                .iter()
                .take(5)
                .map(|(k, e)| (k.to_string(), e.clone()))
                .collect();
            warn!(
                stage = %stage,
                platform = %pf.platform,
                failed = pf.summary.failed,
                attempted = pf.summary.attempted,
                first_failures = ?preview,
                "partial write failure"
            );
            pf.summary
        }
    }
}
