//! Stock freshness policies
//!
//! `ShelfLife` considers data stale after a fixed duration since last write.
//! `AlwaysFreshen` and `NeverFreshen` pin the decision for recompute-always
//! and read-only columns.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{FreshnessPolicy, PluginError, PluginRegistry, PluginResult};
use crate::freshener::FreshenerContext;
use crate::store::RowData;

/// Reference string for [`ShelfLife`].
pub const SHELF_LIFE_REF: &str = "freshdb.stock.shelf_life";
/// Reference string for [`AlwaysFreshen`].
pub const ALWAYS_FRESHEN_REF: &str = "freshdb.stock.always_freshen";
/// Reference string for [`NeverFreshen`].
pub const NEVER_FRESHEN_REF: &str = "freshdb.stock.never_freshen";

/// Parameter key `ShelfLife` falls back to when no serialized state is set.
pub const SHELF_LIFE_PARAM: &str = "shelf_life_ms";

/// Register the stock policies on a plugin registry.
pub fn register(registry: &PluginRegistry) {
    registry.register_policy(SHELF_LIFE_REF, Arc::new(|| Box::new(ShelfLife::default())));
    registry.register_policy(ALWAYS_FRESHEN_REF, Arc::new(|| Box::new(AlwaysFreshen)));
    registry.register_policy(NEVER_FRESHEN_REF, Arc::new(|| Box::new(NeverFreshen)));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShelfLifeState {
    shelf_life_ms: i64,
}

/// Policy that considers a column stale once the newest cell is older than a
/// fixed shelf life. A column with no stored cell is always stale.
#[derive(Debug, Default, Clone)]
pub struct ShelfLife {
    shelf_life_ms: i64,
}

impl ShelfLife {
    /// Create a policy with the given shelf life in milliseconds.
    pub fn new(shelf_life_ms: i64) -> Self {
        Self { shelf_life_ms }
    }

    /// The configured shelf life in milliseconds.
    pub fn shelf_life_ms(&self) -> i64 {
        self.shelf_life_ms
    }

    /// Serialize the shelf life for a policy record's `policy_state`.
    pub fn serialize_state(&self) -> Vec<u8> {
        // Serializing a single i64 field cannot fail.
        serde_json::to_vec(&ShelfLifeState {
            shelf_life_ms: self.shelf_life_ms,
        })
        .unwrap_or_default()
    }
}

impl FreshnessPolicy for ShelfLife {
    fn load(&mut self, state: &[u8], parameters: &BTreeMap<String, String>) -> PluginResult<()> {
        if !state.is_empty() {
            let parsed: ShelfLifeState = serde_json::from_slice(state)
                .map_err(|e| PluginError::BadState(e.to_string()))?;
            self.shelf_life_ms = parsed.shelf_life_ms;
        } else if let Some(raw) = parameters.get(SHELF_LIFE_PARAM) {
            self.shelf_life_ms = raw
                .parse()
                .map_err(|_| PluginError::BadState(format!("bad {}: {}", SHELF_LIFE_PARAM, raw)))?;
        } else {
            return Err(PluginError::BadState(
                "shelf life not configured in state or parameters".into(),
            ));
        }
        if self.shelf_life_ms < 0 {
            return Err(PluginError::BadState(format!(
                "negative shelf life: {}",
                self.shelf_life_ms
            )));
        }
        Ok(())
    }

    fn is_fresh(&self, row: &RowData, ctx: &FreshenerContext) -> bool {
        match row.newest(&ctx.column) {
            Some(cell) => Utc::now().timestamp_millis() - cell.timestamp_ms < self.shelf_life_ms,
            None => false,
        }
    }
}

/// Policy that treats every read as stale: the producer runs on every
/// request.
#[derive(Debug, Default, Clone)]
pub struct AlwaysFreshen;

impl FreshnessPolicy for AlwaysFreshen {
    fn is_fresh(&self, _row: &RowData, _ctx: &FreshenerContext) -> bool {
        false
    }
}

/// Policy that treats every read as fresh: the producer never runs.
#[derive(Debug, Default, Clone)]
pub struct NeverFreshen;

impl FreshnessPolicy for NeverFreshen {
    fn is_fresh(&self, _row: &RowData, _ctx: &FreshenerContext) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnSelector;
    use crate::store::{Cell, DataRequest};
    use serde_json::json;

    fn ctx(column: ColumnSelector) -> FreshenerContext {
        FreshenerContext {
            table: "user".to_string(),
            column: column.clone(),
            attachment: column.clone(),
            client_request: DataRequest::new([column]),
            parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_shelf_life_state_round_trip() {
        let policy = ShelfLife::new(100);
        let mut loaded = ShelfLife::default();
        loaded
            .load(&policy.serialize_state(), &BTreeMap::new())
            .unwrap();
        assert_eq!(loaded.shelf_life_ms(), 100);
    }

    #[test]
    fn test_shelf_life_from_parameters() {
        let mut params = BTreeMap::new();
        params.insert(SHELF_LIFE_PARAM.to_string(), "250".to_string());
        let mut policy = ShelfLife::default();
        policy.load(&[], &params).unwrap();
        assert_eq!(policy.shelf_life_ms(), 250);
    }

    #[test]
    fn test_shelf_life_rejects_garbage_state() {
        let mut policy = ShelfLife::default();
        assert!(matches!(
            policy.load(b"not json", &BTreeMap::new()),
            Err(PluginError::BadState(_))
        ));
        assert!(matches!(
            policy.load(&[], &BTreeMap::new()),
            Err(PluginError::BadState(_))
        ));
    }

    #[test]
    fn test_shelf_life_recent_cell_is_fresh() {
        let column = ColumnSelector::qualified("info", "name");
        let mut row = RowData::new();
        row.insert(
            column.clone(),
            Cell::new(Utc::now().timestamp_millis(), json!("v")),
        );

        let policy = ShelfLife::new(60_000);
        assert!(policy.is_fresh(&row, &ctx(column)));
    }

    #[test]
    fn test_shelf_life_old_cell_is_stale() {
        let column = ColumnSelector::qualified("info", "name");
        let mut row = RowData::new();
        row.insert(
            column.clone(),
            Cell::new(Utc::now().timestamp_millis() - 120_000, json!("v")),
        );

        let policy = ShelfLife::new(60_000);
        assert!(!policy.is_fresh(&row, &ctx(column)));
    }

    #[test]
    fn test_shelf_life_missing_cell_is_stale() {
        let column = ColumnSelector::qualified("info", "name");
        let policy = ShelfLife::new(60_000);
        assert!(!policy.is_fresh(&RowData::new(), &ctx(column)));
    }

    #[test]
    fn test_pinned_policies() {
        let column = ColumnSelector::qualified("info", "name");
        let row = RowData::new();
        assert!(!AlwaysFreshen.is_fresh(&row, &ctx(column.clone())));
        assert!(NeverFreshen.is_fresh(&row, &ctx(column)));
    }
}
