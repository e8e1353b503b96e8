//! Snapshot ingestion: classify newline-delimited export records.
//!
//! Each line is decoded into the record shape expected for the export kind
//! and validated here, at the boundary. Downstream code only ever sees a
//! [`PrimaryUpdate`]. A line that cannot be decoded is counted and skipped;
//! it never ends the stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Deserialize;
use stk_store::{StockKey, StockRecordPatch};
use tracing::{debug, warn};

use crate::{BulkError, ExportKind};

// ---------------------------------------------------------------------------
// Line sources
// ---------------------------------------------------------------------------

/// Single-pass reader over an export result.
#[async_trait]
pub trait LineSource: Send {
    /// Next raw line, or `None` at end of stream.
    async fn next_line(&mut self) -> Result<Option<String>, BulkError>;
}

/// Lines already held in memory (empty exports, fakes).
#[derive(Debug, Default, Clone)]
pub struct StaticLines {
    lines: VecDeque<String>,
}

impl StaticLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LineSource for StaticLines {
    async fn next_line(&mut self) -> Result<Option<String>, BulkError> {
        Ok(self.lines.pop_front())
    }
}

// ---------------------------------------------------------------------------
// Normalized output
// ---------------------------------------------------------------------------

/// One accepted export record, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryUpdate {
    /// Available quantity of an inventory item at a location.
    Level {
        inventory_item_id: String,
        location_id: String,
        available: i64,
    },
    /// Descriptive attributes of a platform-managed variant.
    Descriptor {
        inventory_item_id: String,
        variant_id: String,
        sku: Option<String>,
        parent_id: Option<String>,
        parent_title: Option<String>,
        variant_name: Option<String>,
    },
}

impl PrimaryUpdate {
    pub fn key(&self) -> StockKey {
        match self {
            PrimaryUpdate::Level {
                inventory_item_id, ..
            }
            | PrimaryUpdate::Descriptor {
                inventory_item_id, ..
            } => StockKey::new(inventory_item_id.as_str()),
        }
    }

    /// Partial record update carrying only what this line observed.
    ///
    /// Levels write `primary.current` only; the baseline is the reconciler's.
    pub fn to_patch(&self) -> StockRecordPatch {
        match self {
            PrimaryUpdate::Level {
                inventory_item_id,
                location_id,
                available,
            } => StockRecordPatch {
                primary_current: Some(*available),
                inventory_item_id: Some(inventory_item_id.clone()),
                location_id: Some(location_id.clone()),
                ..Default::default()
            },
            PrimaryUpdate::Descriptor {
                inventory_item_id,
                variant_id,
                sku,
                parent_id,
                parent_title,
                variant_name,
            } => StockRecordPatch {
                inventory_item_id: Some(inventory_item_id.clone()),
                variant_id: Some(variant_id.clone()),
                sku: sku.clone(),
                parent_id: parent_id.clone(),
                parent_title: parent_title.clone(),
                variant_name: variant_name.clone(),
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdRef {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LevelLine {
    #[serde(default)]
    location: Option<IdRef>,
    #[serde(default)]
    available: Option<i64>,
    #[serde(rename = "__parentId", default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantLine {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    inventory_management: Option<String>,
    #[serde(default)]
    inventory_item: Option<IdRef>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    product: Option<ProductRef>,
    #[serde(rename = "__parentId", default)]
    parent_id: Option<String>,
}

const MANAGED_BY_PLATFORM: &str = "SHOPIFY";

enum LineOutcome {
    Accepted(PrimaryUpdate),
    Filtered(&'static str),
    Malformed(String),
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

fn classify_level(line: &str) -> LineOutcome {
    let rec: LevelLine = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };

    // Parent inventory-item lines carry no location.
    let Some(location) = rec.location else {
        return LineOutcome::Filtered("no location reference");
    };
    let Some(location_id) = non_empty(location.id) else {
        return LineOutcome::Filtered("empty location reference");
    };
    let Some(inventory_item_id) = non_empty(rec.parent_id) else {
        return LineOutcome::Malformed("level without parent inventory item".to_string());
    };
    let Some(available) = rec.available else {
        return LineOutcome::Malformed("level without available quantity".to_string());
    };

    LineOutcome::Accepted(PrimaryUpdate::Level {
        inventory_item_id,
        location_id,
        available,
    })
}

fn classify_variant(line: &str) -> LineOutcome {
    let rec: VariantLine = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };

    // Product container lines: no parent, no inventory item.
    if rec.parent_id.is_none() && rec.inventory_item.is_none() {
        return LineOutcome::Filtered("product container line");
    }
    let managed = rec
        .inventory_management
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case(MANAGED_BY_PLATFORM));
    if !managed {
        return LineOutcome::Filtered("not platform-managed");
    }
    let Some(inventory_item_id) = non_empty(rec.inventory_item.and_then(|i| i.id)) else {
        return LineOutcome::Malformed("variant without inventory item id".to_string());
    };
    let Some(variant_id) = non_empty(rec.id) else {
        return LineOutcome::Malformed("variant without id".to_string());
    };
    let (parent_id, parent_title) = match rec.product {
        Some(p) => (non_empty(p.id), non_empty(p.title)),
        None => (non_empty(rec.parent_id), None),
    };

    LineOutcome::Accepted(PrimaryUpdate::Descriptor {
        inventory_item_id,
        variant_id,
        sku: non_empty(rec.sku),
        parent_id,
        parent_title,
        variant_name: non_empty(rec.display_name),
    })
}

// ---------------------------------------------------------------------------
// Ingester
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestStats {
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub filtered: u64,
}

pub struct SnapshotIngester {
    kind: ExportKind,
    stats: IngestStats,
}

impl SnapshotIngester {
    pub fn new(kind: ExportKind) -> Self {
        Self {
            kind,
            stats: IngestStats::default(),
        }
    }

    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Classify one raw line. Blank lines are ignored and not counted.
    pub fn ingest_line(&mut self, line: &str) -> Option<PrimaryUpdate> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.stats.lines += 1;

        let outcome = match self.kind {
            ExportKind::InventoryLevels => classify_level(line),
            ExportKind::ProductVariants => classify_variant(line),
        };

        match outcome {
            LineOutcome::Accepted(u) => {
                self.stats.accepted += 1;
                Some(u)
            }
            LineOutcome::Filtered(reason) => {
                self.stats.filtered += 1;
                debug!(kind = self.kind.as_str(), reason, "export line filtered");
                None
            }
            LineOutcome::Malformed(error) => {
                self.stats.malformed += 1;
                warn!(
                    kind = self.kind.as_str(),
                    line_no = self.stats.lines,
                    %error,
                    "skipping malformed export line"
                );
                None
            }
        }
    }

    /// Next accepted update from `source`, or `None` when it is exhausted.
    ///
    /// Only a failure to read the stream itself is an error.
    pub async fn next_update<S: LineSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<PrimaryUpdate>, BulkError> {
        while let Some(line) = source.next_line().await? {
            if let Some(u) = self.ingest_line(&line) {
                return Ok(Some(u));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
