//! Bulk export query documents.

use stk_bulk::{ExportKind, ExportQuery};

const INVENTORY_LEVELS: &str = r#"{
  inventoryItems {
    edges {
      node {
        id
        inventoryLevels {
          edges {
            node {
              location {
                id
              }
              available
              id
              updatedAt
            }
          }
        }
      }
    }
  }
}"#;

const PRODUCT_VARIANTS: &str = r#"{
  products {
    edges {
      node {
        id
        variants {
          edges {
            node {
              displayName
              id
              inventoryManagement
              inventoryItem {
                id
              }
              sku
              product {
                id
                title
              }
            }
          }
        }
      }
    }
  }
}"#;

pub fn inventory_levels() -> ExportQuery {
    ExportQuery {
        kind: ExportKind::InventoryLevels,
        document: INVENTORY_LEVELS.to_string(),
    }
}

pub fn product_variants() -> ExportQuery {
    ExportQuery {
        kind: ExportKind::ProductVariants,
        document: PRODUCT_VARIANTS.to_string(),
    }
}

pub fn for_kind(kind: ExportKind) -> ExportQuery {
    match kind {
        ExportKind::InventoryLevels => inventory_levels(),
        ExportKind::ProductVariants => product_variants(),
    }
}

pub(crate) const RUN_QUERY_MUTATION: &str = r#"mutation RunBulkExport($query: String!) {
  bulkOperationRunQuery(query: $query) {
    bulkOperation {
      id
      status
    }
    userErrors {
      field
      message
    }
  }
}"#;

pub(crate) const STATUS_QUERY: &str = r#"query BulkExportStatus($id: ID!) {
  node(id: $id) {
    ... on BulkOperation {
      id
      status
      errorCode
      objectCount
      url
    }
  }
}"#;
