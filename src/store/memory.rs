//! In-memory row store
//!
//! Backs the integration tests and small embedded deployments. Semantics
//! match the `RowStore` contract: versioned cells, last write wins per
//! (column, timestamp).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::{Cell, RowData, RowStore};
use crate::column::ColumnSelector;

type RowKey = (String, String);

/// In-memory `RowStore` implementation.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    rows: RwLock<HashMap<RowKey, BTreeMap<ColumnSelector, Vec<Cell>>>>,
}

impl MemoryRowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowStore for MemoryRowStore {
    fn get(
        &self,
        table: &str,
        row_key: &str,
        columns: &[ColumnSelector],
        max_versions: usize,
    ) -> StoreResult<RowData> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))?;

        let mut result = RowData::new();
        let Some(row) = rows.get(&(table.to_string(), row_key.to_string())) else {
            return Ok(result);
        };

        let max_versions = max_versions.max(1);
        for (column, versions) in row {
            let matched = columns.iter().any(|requested| {
                if requested.qualifier.is_some() {
                    requested == column
                } else {
                    requested.family == column.family
                }
            });
            if !matched {
                continue;
            }
            for cell in versions.iter().take(max_versions) {
                result.insert(column.clone(), cell.clone());
            }
        }

        Ok(result)
    }

    fn put(
        &self,
        table: &str,
        row_key: &str,
        column: &ColumnSelector,
        timestamp_ms: i64,
        value: Value,
    ) -> StoreResult<()> {
        if column.qualifier.is_none() {
            return Err(StoreError::WriteFailed {
                row: row_key.to_string(),
                reason: format!("cannot write to family-level selector: {}", column),
            });
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))?;

        let row = rows
            .entry((table.to_string(), row_key.to_string()))
            .or_default();
        let versions = row.entry(column.clone()).or_default();
        let cell = Cell::new(timestamp_ms, value);
        match versions.binary_search_by(|c| cell.timestamp_ms.cmp(&c.timestamp_ms)) {
            Ok(pos) => versions[pos] = cell,
            Err(pos) => versions.insert(pos, cell),
        }

        Ok(())
    }
}
