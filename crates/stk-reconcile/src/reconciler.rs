//! Store-backed reconciliation over every key touched in the run.

use serde::Serialize;
use stk_store::{Platform, StockKey, StockRecordStore};
use tracing::{debug, info, warn};

use crate::engine::{levels_after, reconcile_key};
use crate::{ObservedKeys, OverridePlan, OverrideSet, ReconciliationDelta};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub keys: u64,
    pub new_keys: u64,
    pub overrides: u64,
    pub changed: u64,
    /// Keys dropped for this run because the store failed on them.
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub delta: ReconciliationDelta,
    pub overrides: OverridePlan,
    pub stats: ReconcileStats,
}

pub struct DeltaReconciler<'a, S: StockRecordStore + ?Sized> {
    store: &'a S,
    shop: &'a str,
}

impl<'a, S: StockRecordStore + ?Sized> DeltaReconciler<'a, S> {
    pub fn new(store: &'a S, shop: &'a str) -> Self {
        Self { store, shop }
    }

    /// Reconcile the union of observed keys and override keys.
    ///
    /// Baseline changes are persisted per key before its deltas are kept; a
    /// key whose record cannot be loaded or saved contributes nothing.
    pub async fn reconcile(&self, observed: &ObservedKeys, overrides: &OverrideSet) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut keys = observed.all_keys();
        keys.extend(overrides.quantities.keys().cloned());

        for key in keys {
            report.stats.keys += 1;
            let override_value = overrides.quantities.get(&key).copied();

            let record = match self.store.get(self.shop, &key).await {
                Ok(Some(r)) => r,
                Ok(None) => {
                    warn!(shop = self.shop, %key, "no stock record for key; skipping");
                    report.stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(shop = self.shop, %key, error = %e, "stock record load failed; skipping");
                    report.stats.skipped += 1;
                    continue;
                }
            };

            let outcome = reconcile_key(&record, observed.of(&key), override_value);

            if !outcome.patch.is_empty() {
                if let Err(e) = self.store.upsert_merge(self.shop, &key, &outcome.patch).await {
                    warn!(shop = self.shop, %key, error = %e, "baseline save failed; skipping key");
                    report.stats.skipped += 1;
                    continue;
                }
            }

            if outcome.is_new_key {
                report.stats.new_keys += 1;
                debug!(%key, "first sighting; baseline seeded");
            }

            if let Some(value) = override_value {
                report.stats.overrides += 1;
                for p in [Platform::Primary, Platform::Marketplace] {
                    if levels_after(&record, &outcome.patch, p).initialized {
                        report.overrides.insert(p, key.clone(), value);
                    }
                }
                debug!(%key, value, "override takes priority");
                continue;
            }

            self.keep_deltas(&mut report, &key, outcome.deltas.to_primary, Platform::Primary);
            self.keep_deltas(&mut report, &key, outcome.deltas.to_marketplace, Platform::Marketplace);
            if !outcome.deltas.is_empty() {
                report.stats.changed += 1;
            }
        }

        info!(
            shop = self.shop,
            keys = report.stats.keys,
            new_keys = report.stats.new_keys,
            changed = report.stats.changed,
            overrides = report.stats.overrides,
            skipped = report.stats.skipped,
            primary_has_changes = report.delta.primary_has_changes(),
            marketplace_has_changes = report.delta.marketplace_has_changes(),
            "reconcile complete"
        );
        report
    }

    fn keep_deltas(&self, report: &mut ReconcileReport, key: &StockKey, delta: Option<i64>, target: Platform) {
        if let Some(d) = delta {
            debug!(%key, delta = d, target = %target, "delta");
            report.delta.insert(target, key.clone(), d);
        }
    }
}
