//! Policy registry
//!
//! Persistent mapping from (table, column selector) to
//! `FreshnessPolicyRecord`. Every mutation validates against the live table
//! schema and the current attachment set before committing; batch stores are
//! per-column independent (a failing column never aborts an unrelated one).
//!
//! Registry state is held in memory and mirrored to one JSON document per
//! table under the registry root directory. Mutations hold the registry
//! write lock across validate-and-commit, so two concurrent stores cannot
//! both pass validation against a state one of them is about to invalidate.

mod errors;
mod record;

pub use errors::{FreshnessValidationError, MultiValidationError, RegistryError, RegistryResult};
pub use record::FreshnessPolicyRecord;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::column::ColumnSelector;
use crate::layout::SchemaProvider;
use crate::observability::{FreshEvent, Logger, Severity};
use crate::validation::{validate_attachment, ValidationFailure, ValidationFailureKind};

type TableRecords = BTreeMap<ColumnSelector, FreshnessPolicyRecord>;

/// Observer of registry mutations, used by the freshener instance cache to
/// evict stale entries.
pub trait RegistryListener: Send + Sync {
    /// A record was stored or overwritten for the selector.
    fn record_changed(&self, table: &str, selector: &ColumnSelector);

    /// The record for the selector was removed.
    fn record_removed(&self, table: &str, selector: &ColumnSelector);
}

/// Persistent policy-attachment registry.
pub struct PolicyRegistry {
    root: PathBuf,
    schemas: Arc<dyn SchemaProvider>,
    tables: RwLock<HashMap<String, TableRecords>>,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
}

impl PolicyRegistry {
    /// Open a registry rooted at the given directory, loading any persisted
    /// attachments. The directory is created if absent.
    pub fn open(root: impl Into<PathBuf>, schemas: Arc<dyn SchemaProvider>) -> RegistryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut tables = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path)?;
            let by_selector: BTreeMap<String, FreshnessPolicyRecord> = serde_json::from_str(&raw)?;
            let mut records = TableRecords::new();
            for (selector, record) in by_selector {
                let selector = selector
                    .parse::<ColumnSelector>()
                    .map_err(|e| RegistryError::Internal(e.to_string()))?;
                records.insert(selector, record);
            }
            tables.insert(table.to_string(), records);
        }

        Ok(Self {
            root,
            schemas,
            tables: RwLock::new(tables),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Register a mutation listener.
    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    /// Validate a proposed attachment without mutating anything. Returns the
    /// accumulated failures; empty means admissible.
    pub fn validate(
        &self,
        table: &str,
        selector: &ColumnSelector,
        producer_ref: &str,
        policy_ref: &str,
    ) -> RegistryResult<Vec<ValidationFailure>> {
        let schema = self
            .schemas
            .schema_of(table)
            .ok_or_else(|| RegistryError::UnknownTable(table.to_string()))?;
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let existing = attached_selectors(tables.get(table));
        Ok(validate_attachment(
            table,
            schema.as_ref(),
            &existing,
            selector,
            producer_ref,
            policy_ref,
        ))
    }

    /// Store one attachment. Runs validation first; with `overwrite = false`
    /// an existing record for the exact selector is itself a
    /// `FRESHENER_ALREADY_ATTACHED` conflict. On success the record is
    /// persisted with a fresh `record_version`.
    pub fn store_policy(
        &self,
        table: &str,
        selector: &ColumnSelector,
        record: FreshnessPolicyRecord,
        overwrite: bool,
    ) -> RegistryResult<()> {
        let schema = self
            .schemas
            .schema_of(table)
            .ok_or_else(|| RegistryError::UnknownTable(table.to_string()))?;

        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let current = tables.get(table).cloned().unwrap_or_default();

        let failures = check_store(table, schema.as_ref(), &current, selector, &record, overwrite);
        if !failures.is_empty() {
            return Err(FreshnessValidationError::new(selector.clone(), failures).into());
        }

        let mut updated = current;
        updated.insert(selector.clone(), stamp(record));
        persist_table(&self.root, table, &updated)?;
        tables.insert(table.to_string(), updated);
        drop(tables);

        Logger::log(
            Severity::Info,
            FreshEvent::PolicyAttached,
            &[("table", table), ("column", &selector.to_string())],
        );
        self.notify(|l| l.record_changed(table, selector));
        Ok(())
    }

    /// Store a batch of attachments. Each entry is validated and committed
    /// independently: columns that validate are persisted even when others
    /// fail, and every failure across the batch is aggregated into one
    /// `MultiValidationError`. Callers that need all-or-nothing semantics
    /// should pre-validate with [`PolicyRegistry::validate`] and retry.
    pub fn store_policies(
        &self,
        table: &str,
        entries: BTreeMap<ColumnSelector, FreshnessPolicyRecord>,
        overwrite: bool,
    ) -> RegistryResult<()> {
        let schema = self
            .schemas
            .schema_of(table)
            .ok_or_else(|| RegistryError::UnknownTable(table.to_string()))?;

        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let mut updated = tables.get(table).cloned().unwrap_or_default();

        let mut all_failures: BTreeMap<ColumnSelector, Vec<ValidationFailure>> = BTreeMap::new();
        let mut committed = Vec::new();
        for (selector, record) in entries {
            let failures =
                check_store(table, schema.as_ref(), &updated, &selector, &record, overwrite);
            if failures.is_empty() {
                updated.insert(selector.clone(), stamp(record));
                committed.push(selector);
            } else {
                all_failures.insert(selector, failures);
            }
        }

        if !committed.is_empty() {
            persist_table(&self.root, table, &updated)?;
            tables.insert(table.to_string(), updated);
        }
        drop(tables);

        for selector in &committed {
            Logger::log(
                Severity::Info,
                FreshEvent::PolicyAttached,
                &[("table", table), ("column", &selector.to_string())],
            );
            self.notify(|l| l.record_changed(table, selector));
        }

        if all_failures.is_empty() {
            Ok(())
        } else {
            Err(MultiValidationError::new(all_failures).into())
        }
    }

    /// The record attached to the exact selector, if any.
    pub fn retrieve_policy(
        &self,
        table: &str,
        selector: &ColumnSelector,
    ) -> RegistryResult<Option<FreshnessPolicyRecord>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        Ok(tables
            .get(table)
            .and_then(|records| records.get(selector))
            .cloned())
    }

    /// All attachments for a table.
    pub fn retrieve_policies(&self, table: &str) -> RegistryResult<TableRecords> {
        let tables = self
            .tables
            .read()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    /// Remove the attachment for the exact selector. Removing an absent
    /// record is a no-op.
    pub fn remove_policy(&self, table: &str, selector: &ColumnSelector) -> RegistryResult<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let Some(records) = tables.get(table) else {
            return Ok(());
        };
        if !records.contains_key(selector) {
            return Ok(());
        }

        // Persist before committing to memory so a failed write cannot leave
        // a removal visible in-process that resurrects on the next open.
        let mut updated = records.clone();
        updated.remove(selector);
        persist_table(&self.root, table, &updated)?;
        tables.insert(table.to_string(), updated);
        drop(tables);

        Logger::log(
            Severity::Info,
            FreshEvent::PolicyRemoved,
            &[("table", table), ("column", &selector.to_string())],
        );
        self.notify(|l| l.record_removed(table, selector));
        Ok(())
    }

    /// Remove every attachment for a table, returning the selectors that were
    /// removed. Idempotent: an unattached table yields the empty set.
    pub fn remove_policies(&self, table: &str) -> RegistryResult<BTreeSet<ColumnSelector>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let removed: BTreeSet<ColumnSelector> = tables
            .get(table)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default();
        if removed.is_empty() {
            return Ok(removed);
        }

        // Same ordering as remove_policy: disk first, memory second.
        let path = table_path(&self.root, table);
        if path.exists() {
            fs::remove_file(path)?;
        }
        tables.remove(table);
        drop(tables);

        for selector in &removed {
            Logger::log(
                Severity::Info,
                FreshEvent::PolicyRemoved,
                &[("table", table), ("column", &selector.to_string())],
            );
            self.notify(|l| l.record_removed(table, selector));
        }
        Ok(removed)
    }

    fn notify(&self, f: impl Fn(&Arc<dyn RegistryListener>)) {
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                f(listener);
            }
        }
    }
}

/// Validation for a store: structural checks plus the exact-selector conflict
/// when overwriting is not allowed.
fn check_store(
    table: &str,
    schema: &dyn crate::layout::TableSchema,
    current: &TableRecords,
    selector: &ColumnSelector,
    record: &FreshnessPolicyRecord,
    overwrite: bool,
) -> Vec<ValidationFailure> {
    let existing = attached_selectors(Some(current));
    let mut failures = validate_attachment(
        table,
        schema,
        &existing,
        selector,
        &record.producer_ref,
        &record.policy_ref,
    );
    if !overwrite && current.contains_key(selector) {
        failures.push(ValidationFailure::new(
            ValidationFailureKind::FreshenerAlreadyAttached,
            format!(
                "There is already a freshness policy attached to column: {} in table: {}. \
                 Use overwrite to replace it.",
                selector, table
            ),
        ));
    }
    failures
}

fn attached_selectors(records: Option<&TableRecords>) -> BTreeSet<ColumnSelector> {
    records
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default()
}

fn stamp(mut record: FreshnessPolicyRecord) -> FreshnessPolicyRecord {
    record.record_version = Uuid::new_v4().to_string();
    record
}

fn table_path(root: &Path, table: &str) -> PathBuf {
    root.join(format!("{}.json", table))
}

fn persist_table(root: &Path, table: &str, records: &TableRecords) -> RegistryResult<()> {
    let by_selector: BTreeMap<String, &FreshnessPolicyRecord> = records
        .iter()
        .map(|(selector, record)| (selector.to_string(), record))
        .collect();
    let raw = serde_json::to_string_pretty(&by_selector)?;
    fs::write(table_path(root, table), raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MemorySchemaProvider, MemoryTableSchema};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PolicyRegistry) {
        let tmp = TempDir::new().unwrap();
        let provider = MemorySchemaProvider::new();
        provider.register(
            "user",
            MemoryTableSchema::new()
                .with_group_family("info", ["name", "email"])
                .with_map_family("networks"),
        );
        let registry = PolicyRegistry::open(tmp.path(), Arc::new(provider)).unwrap();
        (tmp, registry)
    }

    fn record() -> FreshnessPolicyRecord {
        FreshnessPolicyRecord::new("acme.fresh.producer", "acme.fresh.policy")
    }

    #[test]
    fn test_store_and_retrieve_round_trip() {
        let (_tmp, registry) = setup();
        let selector = ColumnSelector::qualified("info", "name");
        registry
            .store_policy("user", &selector, record(), false)
            .unwrap();

        let stored = registry
            .retrieve_policy("user", &selector)
            .unwrap()
            .unwrap();
        assert_eq!(stored.producer_ref, "acme.fresh.producer");
        assert_eq!(stored.policy_ref, "acme.fresh.policy");
        assert!(!stored.record_version.is_empty());
    }

    #[test]
    fn test_store_assigns_fresh_record_version() {
        let (_tmp, registry) = setup();
        let selector = ColumnSelector::qualified("info", "name");
        registry
            .store_policy("user", &selector, record(), false)
            .unwrap();
        let first = registry
            .retrieve_policy("user", &selector)
            .unwrap()
            .unwrap();

        registry
            .store_policy("user", &selector, record(), true)
            .unwrap();
        let second = registry
            .retrieve_policy("user", &selector)
            .unwrap()
            .unwrap();
        assert_ne!(first.record_version, second.record_version);
    }

    #[test]
    fn test_duplicate_store_without_overwrite_fails() {
        let (_tmp, registry) = setup();
        let selector = ColumnSelector::qualified("info", "name");
        registry
            .store_policy("user", &selector, record(), false)
            .unwrap();

        let err = registry
            .store_policy("user", &selector, record(), false)
            .unwrap_err();
        match err {
            RegistryError::Validation(v) => {
                assert!(v.contains(ValidationFailureKind::FreshenerAlreadyAttached));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_table_rejected() {
        let (_tmp, registry) = setup();
        let selector = ColumnSelector::qualified("info", "name");
        let err = registry
            .store_policy("ghost", &selector, record(), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTable(_)));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (_tmp, registry) = setup();
        let selector = ColumnSelector::qualified("info", "name");
        registry.remove_policy("user", &selector).unwrap();
        assert!(registry
            .retrieve_policy("user", &selector)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_persistence_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let provider = Arc::new(MemorySchemaProvider::new());
        provider.register(
            "user",
            MemoryTableSchema::new().with_group_family("info", ["name"]),
        );
        let selector = ColumnSelector::qualified("info", "name");

        {
            let registry = PolicyRegistry::open(tmp.path(), provider.clone()).unwrap();
            registry
                .store_policy("user", &selector, record(), false)
                .unwrap();
        }

        let reopened = PolicyRegistry::open(tmp.path(), provider).unwrap();
        let stored = reopened
            .retrieve_policy("user", &selector)
            .unwrap()
            .unwrap();
        assert_eq!(stored.producer_ref, "acme.fresh.producer");
    }

    #[test]
    fn test_batch_commits_valid_columns_and_aggregates_failures() {
        let (_tmp, registry) = setup();
        let name = ColumnSelector::qualified("info", "name");
        registry.store_policy("user", &name, record(), false).unwrap();

        let mut batch = BTreeMap::new();
        batch.insert(name.clone(), record());
        batch.insert(ColumnSelector::qualified("info", "email"), record());

        let err = registry.store_policies("user", batch, false).unwrap_err();
        match err {
            RegistryError::MultiValidation(multi) => {
                assert_eq!(multi.failures.len(), 1);
                assert!(multi.failures.contains_key(&name));
            }
            other => panic!("unexpected error: {}", other),
        }

        // The non-conflicting column committed anyway.
        assert!(registry
            .retrieve_policy("user", &ColumnSelector::qualified("info", "email"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_listener_sees_changes_and_removals() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct Counter {
            changed: AtomicUsize,
            removed: AtomicUsize,
        }
        impl RegistryListener for Counter {
            fn record_changed(&self, _table: &str, _selector: &ColumnSelector) {
                self.changed.fetch_add(1, Ordering::SeqCst);
            }
            fn record_removed(&self, _table: &str, _selector: &ColumnSelector) {
                self.removed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (_tmp, registry) = setup();
        let counter = Arc::new(Counter::default());
        registry.add_listener(counter.clone());

        let selector = ColumnSelector::qualified("info", "name");
        registry
            .store_policy("user", &selector, record(), false)
            .unwrap();
        registry.remove_policy("user", &selector).unwrap();

        assert_eq!(counter.changed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }
}
