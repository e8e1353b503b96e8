//! Pure delta attribution. No IO.

use std::collections::BTreeMap;

use stk_store::{Platform, StockKey, StockLevels, StockRecord, StockRecordPatch};

use crate::{KeyDeltas, KeyOutcome, Observed, ReconciliationDelta};

const PLATFORMS: [Platform; 2] = [Platform::Primary, Platform::Marketplace];

/// Attribute each side's change to the OTHER side.
///
/// A change is propagated only when the receiving side is initialized; an
/// uninitialized side has no counterpart to adjust and its zero baseline is
/// never read as a depletion.
pub fn attribute_deltas(primary: &StockLevels, marketplace: &StockLevels) -> KeyDeltas {
    KeyDeltas {
        to_marketplace: if marketplace.initialized {
            primary.change()
        } else {
            None
        },
        to_primary: if primary.initialized {
            marketplace.change()
        } else {
            None
        },
    }
}

/// [`attribute_deltas`] over two named snapshots. A key missing from one
/// snapshot counts as uninitialized on that side.
pub fn compute_deltas(
    primary: &BTreeMap<StockKey, StockLevels>,
    marketplace: &BTreeMap<StockKey, StockLevels>,
) -> ReconciliationDelta {
    let mut out = ReconciliationDelta::default();
    let keys: std::collections::BTreeSet<&StockKey> =
        primary.keys().chain(marketplace.keys()).collect();

    for key in keys {
        let a = primary.get(key).copied().unwrap_or_default();
        let b = marketplace.get(key).copied().unwrap_or_default();
        let d = attribute_deltas(&a, &b);
        if let Some(v) = d.to_primary {
            out.primary.insert(key.clone(), v);
        }
        if let Some(v) = d.to_marketplace {
            out.marketplace.insert(key.clone(), v);
        }
    }
    out
}

/// Decide one key.
///
/// 1. Every observed side that was never initialized is seeded
///    (`previous = current`). A key with no side initialized before this run
///    is new and emits no delta.
/// 2. A key under override emits no delta; observed sides are acknowledged
///    and the forced value is applied later.
/// 3. Otherwise each side's change is attributed to the opposite side. A
///    side seeded in this run has no change of its own but still receives
///    the change of an already initialized counterpart.
///
/// Observed sides always end with `previous = current` so the same change is
/// never derived twice.
pub fn reconcile_key(
    record: &StockRecord,
    observed: Observed,
    override_value: Option<i64>,
) -> KeyOutcome {
    let mut levels = [record.primary, record.marketplace];
    let mut patch = StockRecordPatch::default();
    let mut is_new_key = false;
    let had_baseline = levels.iter().any(|l| l.initialized);

    for (i, p) in PLATFORMS.iter().enumerate() {
        if observed.side(*p) && !levels[i].initialized {
            levels[i] = StockLevels::seeded(levels[i].current);
            is_new_key = true;
        }
    }

    let deltas = if !had_baseline || override_value.is_some() {
        KeyDeltas::default()
    } else {
        attribute_deltas(&levels[0], &levels[1])
    };

    for (i, p) in PLATFORMS.iter().enumerate() {
        if observed.side(*p) {
            let acked = StockLevels {
                previous: levels[i].current,
                ..levels[i]
            };
            if acked != *record.levels(*p) {
                patch.set_levels(*p, acked);
            }
        }
    }

    KeyOutcome {
        deltas,
        is_new_key,
        override_applied: override_value.is_some(),
        patch,
    }
}

/// Levels for `record` after `outcome.patch` is applied.
pub(crate) fn levels_after(record: &StockRecord, patch: &StockRecordPatch, p: Platform) -> StockLevels {
    let base = *record.levels(p);
    match p {
        Platform::Primary => StockLevels {
            current: patch.primary_current.unwrap_or(base.current),
            previous: patch.primary_previous.unwrap_or(base.previous),
            initialized: patch.primary_initialized.unwrap_or(base.initialized),
        },
        Platform::Marketplace => StockLevels {
            current: patch.marketplace_current.unwrap_or(base.current),
            previous: patch.marketplace_previous.unwrap_or(base.previous),
            initialized: patch.marketplace_initialized.unwrap_or(base.initialized),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lv(previous: i64, current: i64) -> StockLevels {
        StockLevels {
            current,
            previous,
            initialized: true,
        }
    }

    fn record(primary: StockLevels, marketplace: StockLevels) -> StockRecord {
        let mut r = StockRecord::new(StockKey::new("K1"));
        r.primary = primary;
        r.marketplace = marketplace;
        r
    }

    const BOTH: Observed = Observed {
        primary: true,
        marketplace: true,
    };

    #[test]
    fn primary_change_goes_to_marketplace_map() {
        let d = attribute_deltas(&lv(10, 7), &lv(7, 7));
        assert_eq!(d.to_marketplace, Some(-3));
        assert_eq!(d.to_primary, None);
    }

    #[test]
    fn marketplace_change_goes_to_primary_map() {
        let d = attribute_deltas(&lv(7, 7), &lv(7, 4));
        assert_eq!(d.to_primary, Some(-3));
        assert_eq!(d.to_marketplace, None);
    }

    #[test]
    fn uninitialized_receiver_gets_nothing() {
        let uninit = StockLevels {
            current: 0,
            previous: 0,
            initialized: false,
        };
        let d = attribute_deltas(&lv(10, 7), &uninit);
        assert!(d.is_empty());

        // A zero baseline on an uninitialized side is not a depletion.
        let stale = StockLevels {
            current: 0,
            previous: 5,
            initialized: false,
        };
        assert!(attribute_deltas(&stale, &lv(3, 3)).is_empty());
    }

    #[test]
    fn snapshot_maps_are_attributed_by_name() {
        let k1 = StockKey::new("K1");
        let k2 = StockKey::new("K2");
        let primary = BTreeMap::from([(k1.clone(), lv(10, 7)), (k2.clone(), lv(5, 5))]);
        let marketplace = BTreeMap::from([(k1.clone(), lv(7, 7)), (k2.clone(), lv(5, 8))]);

        let out = compute_deltas(&primary, &marketplace);
        assert_eq!(out.marketplace.get(&k1), Some(&-3));
        assert_eq!(out.primary.get(&k2), Some(&3));
        assert!(out.primary.get(&k1).is_none());
        assert!(out.primary_has_changes() && out.marketplace_has_changes());
    }

    #[test]
    fn first_sighting_seeds_without_delta() {
        let rec = record(
            StockLevels {
                current: 12,
                previous: 0,
                initialized: false,
            },
            StockLevels {
                current: 9,
                previous: 0,
                initialized: false,
            },
        );
        let out = reconcile_key(&rec, BOTH, None);
        assert!(out.is_new_key);
        assert!(out.deltas.is_empty());
        assert_eq!(out.patch.primary_previous, Some(12));
        assert_eq!(out.patch.primary_initialized, Some(true));
        assert_eq!(out.patch.marketplace_previous, Some(9));
    }

    #[test]
    fn newly_linked_side_receives_counterpart_change() {
        let rec = record(
            lv(10, 7),
            StockLevels {
                current: 10,
                previous: 0,
                initialized: false,
            },
        );
        let out = reconcile_key(&rec, BOTH, None);
        assert!(out.is_new_key);
        assert_eq!(out.deltas.to_marketplace, Some(-3));
        // The seeded side has no change of its own to send back.
        assert_eq!(out.deltas.to_primary, None);
        assert_eq!(out.patch.primary_previous, Some(7));
        assert_eq!(out.patch.marketplace_previous, Some(10));
        assert_eq!(out.patch.marketplace_initialized, Some(true));
    }

    #[test]
    fn newly_linked_side_with_idle_counterpart_is_quiet() {
        let rec = record(
            lv(7, 7),
            StockLevels {
                current: 4,
                previous: 0,
                initialized: false,
            },
        );
        let out = reconcile_key(&rec, BOTH, None);
        assert!(out.is_new_key);
        assert!(out.deltas.is_empty());
    }

    #[test]
    fn override_suppresses_computed_delta() {
        let rec = record(lv(10, 5), lv(10, 10));
        let out = reconcile_key(&rec, BOTH, Some(50));
        assert!(out.override_applied);
        assert!(out.deltas.is_empty());
        assert_eq!(out.patch.primary_previous, Some(5));
    }

    #[test]
    fn ordinary_change_is_acked_on_source() {
        let rec = record(lv(10, 7), lv(7, 7));
        let out = reconcile_key(&rec, BOTH, None);
        assert_eq!(out.deltas.to_marketplace, Some(-3));
        assert!(!out.is_new_key);
        assert_eq!(out.patch.primary_previous, Some(7));
        // Unchanged side needs no write.
        assert_eq!(out.patch.marketplace_previous, None);
        assert_eq!(levels_after(&rec, &out.patch, Platform::Primary), lv(7, 7));
    }

    #[test]
    fn double_edit_applies_both_directions() {
        let rec = record(lv(10, 8), lv(10, 9));
        let out = reconcile_key(&rec, BOTH, None);
        assert_eq!(out.deltas.to_marketplace, Some(-2));
        assert_eq!(out.deltas.to_primary, Some(-1));
    }

    #[test]
    fn unobserved_side_is_not_seeded() {
        let rec = record(lv(4, 4), StockLevels::default());
        let out = reconcile_key(
            &rec,
            Observed {
                primary: true,
                marketplace: false,
            },
            None,
        );
        assert!(!out.is_new_key);
        assert!(out.patch.is_empty());
    }
}
