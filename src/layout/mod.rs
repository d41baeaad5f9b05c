//! Table schema facts
//!
//! The freshening engine never administers table layouts; it only needs two
//! facts about a table to validate policy attachments: whether a qualified
//! column exists, and whether a family is map-type (arbitrary qualifiers
//! allowed). Those facts come through the `TableSchema` seam, looked up per
//! table through a `SchemaProvider`.
//!
//! `MemoryTableSchema` / `MemorySchemaProvider` are the in-memory
//! implementations used by tests and by embedders that keep layouts in
//! process memory.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Schema facts for a single table, consumed by the validation engine.
pub trait TableSchema: Send + Sync {
    /// Whether the fully qualified column exists in this table.
    ///
    /// Map-type families accept any qualifier; group-type families only the
    /// qualifiers the layout declares.
    fn column_exists(&self, family: &str, qualifier: &str) -> bool;

    /// Whether the family is map-type (qualifiers not fixed by schema).
    fn is_map_type_family(&self, family: &str) -> bool;
}

/// Source of per-table schema facts.
pub trait SchemaProvider: Send + Sync {
    /// Schema facts for the named table, if the table exists.
    fn schema_of(&self, table: &str) -> Option<Arc<dyn TableSchema>>;
}

/// In-memory table layout.
#[derive(Debug, Default, Clone)]
pub struct MemoryTableSchema {
    /// Group-type families with their declared qualifiers.
    group_families: HashMap<String, BTreeSet<String>>,
    /// Map-type families.
    map_families: BTreeSet<String>,
}

impl MemoryTableSchema {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group-type family with a fixed set of qualifiers.
    pub fn with_group_family<I, S>(mut self, family: impl Into<String>, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_families.insert(
            family.into(),
            qualifiers.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Declare a map-type family.
    pub fn with_map_family(mut self, family: impl Into<String>) -> Self {
        self.map_families.insert(family.into());
        self
    }
}

impl TableSchema for MemoryTableSchema {
    fn column_exists(&self, family: &str, qualifier: &str) -> bool {
        if self.map_families.contains(family) {
            return true;
        }
        self.group_families
            .get(family)
            .is_some_and(|qualifiers| qualifiers.contains(qualifier))
    }

    fn is_map_type_family(&self, family: &str) -> bool {
        self.map_families.contains(family)
    }
}

/// In-memory schema provider mapping table names to layouts.
#[derive(Debug, Default)]
pub struct MemorySchemaProvider {
    tables: RwLock<HashMap<String, Arc<MemoryTableSchema>>>,
}

impl MemorySchemaProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the layout for a table.
    pub fn register(&self, table: impl Into<String>, schema: MemoryTableSchema) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(table.into(), Arc::new(schema));
        }
    }
}

impl SchemaProvider for MemorySchemaProvider {
    fn schema_of(&self, table: &str) -> Option<Arc<dyn TableSchema>> {
        let tables = self.tables.read().ok()?;
        tables
            .get(table)
            .cloned()
            .map(|schema| schema as Arc<dyn TableSchema>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> MemoryTableSchema {
        MemoryTableSchema::new()
            .with_group_family("info", ["name", "email"])
            .with_map_family("networks")
    }

    #[test]
    fn test_group_family_qualifiers_are_fixed() {
        let schema = user_schema();
        assert!(schema.column_exists("info", "name"));
        assert!(schema.column_exists("info", "email"));
        assert!(!schema.column_exists("info", "invalid"));
    }

    #[test]
    fn test_map_family_accepts_any_qualifier() {
        let schema = user_schema();
        assert!(schema.column_exists("networks", "anything"));
        assert!(schema.is_map_type_family("networks"));
        assert!(!schema.is_map_type_family("info"));
    }

    #[test]
    fn test_unknown_family_has_no_columns() {
        let schema = user_schema();
        assert!(!schema.column_exists("missing", "name"));
        assert!(!schema.is_map_type_family("missing"));
    }

    #[test]
    fn test_provider_lookup() {
        let provider = MemorySchemaProvider::new();
        provider.register("user", user_schema());

        assert!(provider.schema_of("user").is_some());
        assert!(provider.schema_of("ghost").is_none());
    }
}
