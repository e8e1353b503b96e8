//! stk-reconcile
//!
//! Reconciliation engine: decides, per stocked item, whether and how much to
//! adjust each platform, then writes the result back.
//!
//! - `engine`: pure attribution of observed changes to the opposite platform
//! - `DeltaReconciler`: runs the per-key decision over the store
//! - `OverrideResolver`: loads operator forced-quantity and SKU-link requests
//! - `StockMutator`: best-effort write-back and baseline update
//!
//! Output maps are `BTreeMap`s so runs are deterministic.

mod engine;
mod mutator;
mod overrides;
mod reconciler;
mod types;

pub use engine::{attribute_deltas, compute_deltas, reconcile_key};
pub use mutator::{
    propagated_quantity, ApplySummary, PartialFailure, StockMutator, StockWrite, StockWriter,
    WriteError,
};
pub use overrides::OverrideResolver;
pub use reconciler::{DeltaReconciler, ReconcileReport, ReconcileStats};
pub use stk_store::Platform;
pub use types::*;
