//! Freshening read results

use std::collections::BTreeMap;
use std::fmt;

use crate::column::ColumnSelector;
use crate::store::Cell;

/// Terminal state of one (request, column) freshening decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessDecision {
    /// The stored value passed the freshness check and was returned as is.
    Fresh,
    /// The producer completed within the deadline; its value was written
    /// back and returned.
    Recomputed,
    /// The deadline elapsed first; the stored value was returned while the
    /// producer keeps running in the background.
    StaleFallback,
    /// The freshener failed to load or the producer failed; the stored value
    /// was returned.
    Error,
}

impl FreshnessDecision {
    /// Stable string form for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessDecision::Fresh => "fresh",
            FreshnessDecision::Recomputed => "recomputed",
            FreshnessDecision::StaleFallback => "stale_fallback",
            FreshnessDecision::Error => "error",
        }
    }
}

impl fmt::Display for FreshnessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-column failure reported alongside an otherwise successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Column the failure applies to.
    pub column: ColumnSelector,
    /// What went wrong.
    pub message: String,
}

/// Merged outcome of one freshening row read.
///
/// Every requested column that held stored data is present; columns with a
/// matched attachment additionally carry a [`FreshnessDecision`]. Failures
/// never remove a column from the result, they surface as diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FreshRowResult {
    /// Row key the result belongs to.
    pub row_key: String,
    columns: BTreeMap<ColumnSelector, Vec<Cell>>,
    decisions: BTreeMap<ColumnSelector, FreshnessDecision>,
    diagnostics: Vec<Diagnostic>,
}

impl FreshRowResult {
    /// Create an empty result for a row.
    pub fn new(row_key: impl Into<String>) -> Self {
        Self {
            row_key: row_key.into(),
            ..Default::default()
        }
    }

    /// Set the stored cells for a column.
    pub(crate) fn set_cells(&mut self, column: ColumnSelector, cells: Vec<Cell>) {
        if !cells.is_empty() {
            self.columns.insert(column, cells);
        }
    }

    /// Prepend a freshly recomputed cell for a column.
    pub(crate) fn prepend_cell(&mut self, column: ColumnSelector, cell: Cell) {
        self.columns.entry(column).or_default().insert(0, cell);
    }

    /// Record the terminal decision for a column.
    pub(crate) fn set_decision(&mut self, column: ColumnSelector, decision: FreshnessDecision) {
        self.decisions.insert(column, decision);
    }

    /// Attach a per-column diagnostic.
    pub(crate) fn add_diagnostic(&mut self, column: ColumnSelector, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            column,
            message: message.into(),
        });
    }

    /// Versions returned for a column, newest first.
    pub fn cells(&self, column: &ColumnSelector) -> &[Cell] {
        self.columns.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Newest cell returned for a column.
    pub fn newest(&self, column: &ColumnSelector) -> Option<&Cell> {
        self.cells(column).first()
    }

    /// The freshening decision for a column, absent for columns with no
    /// matched attachment.
    pub fn decision(&self, column: &ColumnSelector) -> Option<FreshnessDecision> {
        self.decisions.get(column).copied()
    }

    /// All per-column decisions.
    pub fn decisions(&self) -> &BTreeMap<ColumnSelector, FreshnessDecision> {
        &self.decisions
    }

    /// Per-column failures collected during the read.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// All returned columns with their cells.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnSelector, &Vec<Cell>)> {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recomputed_cell_leads() {
        let column = ColumnSelector::qualified("info", "name");
        let mut result = FreshRowResult::new("foo");
        result.set_cells(column.clone(), vec![Cell::new(5, json!("old"))]);
        result.prepend_cell(column.clone(), Cell::new(9, json!("new")));

        assert_eq!(result.newest(&column).unwrap().value, json!("new"));
        assert_eq!(result.cells(&column).len(), 2);
    }

    #[test]
    fn test_empty_stored_cells_are_omitted() {
        let column = ColumnSelector::qualified("info", "name");
        let mut result = FreshRowResult::new("foo");
        result.set_cells(column.clone(), Vec::new());
        assert!(result.newest(&column).is_none());
    }

    #[test]
    fn test_decision_strings() {
        assert_eq!(FreshnessDecision::Fresh.as_str(), "fresh");
        assert_eq!(FreshnessDecision::StaleFallback.as_str(), "stale_fallback");
    }
}
