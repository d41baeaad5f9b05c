//! Row-store collaborator
//!
//! The engine reads and writes cells through the `RowStore` seam. No
//! consistency stronger than last-write-wins per cell is assumed; producers
//! do not run under transactional isolation against the store.

mod errors;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryRowStore;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::column::ColumnSelector;

/// A single versioned cell value.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Write timestamp in milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Cell value.
    pub value: Value,
}

impl Cell {
    /// Create a cell.
    pub fn new(timestamp_ms: i64, value: Value) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Versioned cells for one row, keyed by fully qualified column.
///
/// Cell vectors are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowData {
    cells: BTreeMap<ColumnSelector, Vec<Cell>>,
}

impl RowData {
    /// Create empty row data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell, keeping versions ordered newest first. A cell with a
    /// duplicate timestamp replaces the existing one (last write wins).
    pub fn insert(&mut self, column: ColumnSelector, cell: Cell) {
        let versions = self.cells.entry(column).or_default();
        match versions.binary_search_by(|c| cell.timestamp_ms.cmp(&c.timestamp_ms)) {
            Ok(pos) => versions[pos] = cell,
            Err(pos) => versions.insert(pos, cell),
        }
    }

    /// All versions of a column, newest first.
    pub fn versions(&self, column: &ColumnSelector) -> &[Cell] {
        self.cells.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Newest cell for a column. For a family-level selector this is the
    /// newest cell across every qualified column in the family.
    pub fn newest(&self, column: &ColumnSelector) -> Option<&Cell> {
        if column.qualifier.is_some() {
            return self.versions(column).first();
        }
        self.cells
            .iter()
            .filter(|(c, _)| c.family == column.family)
            .filter_map(|(_, versions)| versions.first())
            .max_by_key(|cell| cell.timestamp_ms)
    }

    /// Whether the row holds any cell for the column.
    pub fn contains(&self, column: &ColumnSelector) -> bool {
        self.newest(column).is_some()
    }

    /// Qualified columns present in the given family.
    pub fn columns_in_family(&self, family: &str) -> Vec<ColumnSelector> {
        self.cells
            .keys()
            .filter(|c| c.family == family)
            .cloned()
            .collect()
    }

    /// Iterate over all (column, versions) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnSelector, &Vec<Cell>)> {
        self.cells.iter()
    }

    /// Whether the row holds no cells at all.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A client row-read request: which columns to fetch and how many versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Requested columns; family selectors cover every qualifier present.
    pub columns: Vec<ColumnSelector>,
    /// Maximum number of versions to return per column.
    pub max_versions: usize,
}

impl DataRequest {
    /// Request the newest version of the given columns.
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnSelector>,
    {
        Self {
            columns: columns.into_iter().collect(),
            max_versions: 1,
        }
    }

    /// Set the maximum number of versions per column.
    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions.max(1);
        self
    }
}

/// Versioned row store with last-write-wins cells.
pub trait RowStore: Send + Sync {
    /// Read the requested columns of a row. Family selectors expand to every
    /// qualified column present in that family. Absent columns are simply
    /// missing from the result; an absent row yields empty `RowData`.
    fn get(
        &self,
        table: &str,
        row_key: &str,
        columns: &[ColumnSelector],
        max_versions: usize,
    ) -> StoreResult<RowData>;

    /// Write one cell at the given timestamp.
    fn put(
        &self,
        table: &str,
        row_key: &str,
        column: &ColumnSelector,
        timestamp_ms: i64,
        value: Value,
    ) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_data_orders_newest_first() {
        let mut row = RowData::new();
        let col = ColumnSelector::qualified("info", "name");
        row.insert(col.clone(), Cell::new(5, json!("old")));
        row.insert(col.clone(), Cell::new(9, json!("new")));
        row.insert(col.clone(), Cell::new(7, json!("mid")));

        let versions = row.versions(&col);
        let stamps: Vec<i64> = versions.iter().map(|c| c.timestamp_ms).collect();
        assert_eq!(stamps, vec![9, 7, 5]);
        assert_eq!(row.newest(&col).unwrap().value, json!("new"));
    }

    #[test]
    fn test_row_data_duplicate_timestamp_replaces() {
        let mut row = RowData::new();
        let col = ColumnSelector::qualified("info", "name");
        row.insert(col.clone(), Cell::new(5, json!("first")));
        row.insert(col.clone(), Cell::new(5, json!("second")));

        assert_eq!(row.versions(&col).len(), 1);
        assert_eq!(row.newest(&col).unwrap().value, json!("second"));
    }

    #[test]
    fn test_family_newest_spans_qualifiers() {
        let mut row = RowData::new();
        row.insert(
            ColumnSelector::qualified("networks", "a"),
            Cell::new(3, json!(1)),
        );
        row.insert(
            ColumnSelector::qualified("networks", "b"),
            Cell::new(8, json!(2)),
        );

        let family = ColumnSelector::family("networks");
        assert_eq!(row.newest(&family).unwrap().timestamp_ms, 8);
        assert_eq!(row.columns_in_family("networks").len(), 2);
    }

    #[test]
    fn test_absent_column() {
        let row = RowData::new();
        let col = ColumnSelector::qualified("info", "name");
        assert!(row.versions(&col).is_empty());
        assert!(row.newest(&col).is_none());
        assert!(!row.contains(&col));
    }
}
