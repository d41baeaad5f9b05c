//! Freshener instance cache
//!
//! Memoizes constructed (policy, producer, setup context) triples keyed by
//! (table, selector). Each entry is stamped with the record version it was
//! built from; a version mismatch on access, or an explicit invalidation
//! from a registry mutation, evicts the entry and runs cleanup before a
//! replacement is constructed.
//!
//! First construction per key is single-flight: concurrent racers serialize
//! on a per-key build lock and re-check the cache after acquiring it, so
//! setup runs exactly once. Steady-state hits take only the read lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::column::ColumnSelector;
use crate::freshener::context::FreshenerSetupContext;
use crate::freshener::errors::{FreshenerError, FreshenerResult};
use crate::observability::{FreshEvent, Logger, Severity};
use crate::plugin::{FreshnessPolicy, PluginRegistry, Producer};
use crate::registry::{FreshnessPolicyRecord, RegistryListener};

type Key = (String, ColumnSelector);

/// A loaded (policy, producer) pair with its setup context.
pub struct Freshener {
    /// Version of the record this pair was built from.
    pub record_version: String,
    /// Producer reference the pair was built from.
    pub producer_ref: String,
    /// The staleness predicate.
    pub policy: Arc<dyn FreshnessPolicy>,
    /// The recomputation function.
    pub producer: Arc<dyn Producer>,
    /// Long-lived setup context.
    pub setup: Arc<FreshenerSetupContext>,
}

/// Cache of loaded fresheners with single-flight construction.
pub struct FreshenerCache {
    plugins: Arc<PluginRegistry>,
    entries: RwLock<HashMap<Key, Arc<Freshener>>>,
    /// Producer instances parked on invalidation, eligible for carry-over
    /// when the replacement record keeps the same producer_ref and does not
    /// request reinitialization.
    parked: Mutex<HashMap<Key, (String, Arc<dyn Producer>)>>,
    building: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl FreshenerCache {
    /// Create a cache resolving plugins through the given registry.
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self {
            plugins,
            entries: RwLock::new(HashMap::new()),
            parked: Mutex::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get the freshener for (table, selector), constructing it on first
    /// access and rebuilding it when the stored record's version differs
    /// from the cached one.
    pub fn get(
        &self,
        table: &str,
        selector: &ColumnSelector,
        record: &FreshnessPolicyRecord,
    ) -> FreshenerResult<Arc<Freshener>> {
        let key = (table.to_string(), selector.clone());

        if let Some(entry) = self.lookup(&key, &record.record_version)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let build_lock = {
            let mut building = self
                .building
                .lock()
                .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
            building.entry(key.clone()).or_default().clone()
        };
        let _guard = build_lock
            .lock()
            .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;

        // A racer may have built the entry while we waited on the lock.
        if let Some(entry) = self.lookup(&key, &record.record_version)? {
            return Ok(entry);
        }

        // Evict a version-mismatched entry before rebuilding.
        let stale = {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
            entries.remove(&key)
        };
        if let Some(old) = stale {
            self.retire(&key, old, true)?;
        }

        let result = self.build(&key, table, selector, record);
        if let Ok(mut building) = self.building.lock() {
            building.remove(&key);
        }

        match result {
            Ok(entry) => {
                let mut entries = self
                    .entries
                    .write()
                    .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
                entries.insert(key, entry.clone());
                Logger::log(
                    Severity::Info,
                    FreshEvent::FreshenerLoaded,
                    &[
                        ("table", table),
                        ("column", &selector.to_string()),
                        ("record_version", &record.record_version),
                    ],
                );
                Ok(entry)
            }
            Err(e) => {
                Logger::log_stderr(
                    Severity::Warn,
                    FreshEvent::FreshenerLoadFailed,
                    &[
                        ("table", table),
                        ("column", &selector.to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                Err(e)
            }
        }
    }

    /// Evict the entry for (table, selector) because its record changed. The
    /// policy is cleaned up immediately; the producer is parked so the next
    /// build can carry it over if the replacement record allows it.
    pub fn invalidate(&self, table: &str, selector: &ColumnSelector) {
        let key = (table.to_string(), selector.clone());
        let old = self.entries.write().ok().and_then(|mut e| e.remove(&key));
        if let Some(old) = old {
            let _ = self.retire(&key, old, true);
        }
    }

    /// Evict the entry for (table, selector) because its record was removed.
    /// Both instances are cleaned up; nothing is parked.
    pub fn remove(&self, table: &str, selector: &ColumnSelector) {
        let key = (table.to_string(), selector.clone());
        let old = self.entries.write().ok().and_then(|mut e| e.remove(&key));
        if let Some(old) = old {
            let _ = self.retire(&key, old, false);
        }
        if let Ok(mut parked) = self.parked.lock() {
            if let Some((_, producer)) = parked.remove(&key) {
                Self::cleanup_producer(&key, &producer);
            }
        }
    }

    /// Clean up every cached and parked instance. Called at shutdown.
    pub fn shutdown(&self) {
        let drained: Vec<(Key, Arc<Freshener>)> = self
            .entries
            .write()
            .map(|mut e| e.drain().collect())
            .unwrap_or_default();
        for (key, old) in drained {
            let _ = self.retire(&key, old, false);
        }
        if let Ok(mut parked) = self.parked.lock() {
            for (key, (_, producer)) in parked.drain() {
                Self::cleanup_producer(&key, &producer);
            }
        }
    }

    /// Cache hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn lookup(&self, key: &Key, record_version: &str) -> FreshenerResult<Option<Arc<Freshener>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.record_version == record_version)
            .cloned())
    }

    fn build(
        &self,
        key: &Key,
        table: &str,
        selector: &ColumnSelector,
        record: &FreshnessPolicyRecord,
    ) -> FreshenerResult<Arc<Freshener>> {
        let setup = Arc::new(FreshenerSetupContext {
            table: table.to_string(),
            attachment: selector.clone(),
            parameters: record.parameters.clone(),
            record_version: record.record_version.clone(),
        });

        let mut policy = self.plugins.new_policy(&record.policy_ref)?;
        policy.load(&record.policy_state, &record.parameters)?;
        policy.setup(&setup)?;
        let policy: Arc<dyn FreshnessPolicy> = Arc::from(policy);

        let carried = {
            let mut parked = self
                .parked
                .lock()
                .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
            parked.remove(key)
        };
        let producer: Arc<dyn Producer> = match carried {
            Some((parked_ref, parked_producer))
                if parked_ref == record.producer_ref && !record.reinitialize_producer =>
            {
                parked_producer
            }
            other => {
                if let Some((_, parked_producer)) = other {
                    Self::cleanup_producer(key, &parked_producer);
                }
                let mut producer = self.plugins.new_producer(&record.producer_ref)?;
                producer.setup(&setup)?;
                Arc::from(producer)
            }
        };

        Ok(Arc::new(Freshener {
            record_version: record.record_version.clone(),
            producer_ref: record.producer_ref.clone(),
            policy,
            producer,
            setup,
        }))
    }

    /// Clean up an evicted entry. With `park_producer` the producer instance
    /// is kept aside for carry-over instead of being cleaned up.
    fn retire(&self, key: &Key, old: Arc<Freshener>, park_producer: bool) -> FreshenerResult<()> {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Logger::log(
            Severity::Info,
            FreshEvent::FreshenerEvicted,
            &[
                ("table", &key.0),
                ("column", &key.1.to_string()),
                ("record_version", &old.record_version),
            ],
        );

        if let Err(e) = old.policy.cleanup() {
            Logger::log_stderr(
                Severity::Warn,
                FreshEvent::FreshenerEvicted,
                &[("column", &key.1.to_string()), ("error", &e.to_string())],
            );
        }

        if park_producer {
            let mut parked = self
                .parked
                .lock()
                .map_err(|_| FreshenerError::Internal("Lock poisoned".into()))?;
            if let Some((_, previous)) = parked.insert(
                key.clone(),
                (old.producer_ref.clone(), old.producer.clone()),
            ) {
                Self::cleanup_producer(key, &previous);
            }
        } else {
            Self::cleanup_producer(key, &old.producer);
        }
        Ok(())
    }

    fn cleanup_producer(key: &Key, producer: &Arc<dyn Producer>) {
        if let Err(e) = producer.cleanup() {
            Logger::log_stderr(
                Severity::Warn,
                FreshEvent::FreshenerEvicted,
                &[("column", &key.1.to_string()), ("error", &e.to_string())],
            );
        }
    }
}

impl RegistryListener for FreshenerCache {
    fn record_changed(&self, table: &str, selector: &ColumnSelector) {
        self.invalidate(table, selector);
    }

    fn record_removed(&self, table: &str, selector: &ColumnSelector) {
        self.remove(table, selector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshener::context::FreshenerContext;
    use crate::plugin::{PluginResult, ProducerError};
    use crate::store::RowData;
    use serde_json::{json, Value};
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        policy_setups: AtomicUsize,
        policy_cleanups: AtomicUsize,
        producer_setups: AtomicUsize,
        producer_cleanups: AtomicUsize,
    }

    struct CountingPolicy(Arc<Counters>);
    impl FreshnessPolicy for CountingPolicy {
        fn setup(&mut self, _ctx: &FreshenerSetupContext) -> PluginResult<()> {
            self.0.policy_setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn cleanup(&self) -> PluginResult<()> {
            self.0.policy_cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn is_fresh(&self, _row: &RowData, _ctx: &FreshenerContext) -> bool {
            true
        }
    }

    struct CountingProducer(Arc<Counters>);
    impl Producer for CountingProducer {
        fn required_columns(&self) -> BTreeSet<ColumnSelector> {
            BTreeSet::new()
        }
        fn setup(&mut self, _ctx: &FreshenerSetupContext) -> PluginResult<()> {
            self.0.producer_setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn cleanup(&self) -> PluginResult<()> {
            self.0.producer_cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn produce(&self, _row: &RowData, _ctx: &FreshenerContext) -> Result<Value, ProducerError> {
            Ok(json!("value"))
        }
    }

    fn plugins(counters: Arc<Counters>) -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        let c = counters.clone();
        registry.register_policy("test.policy", Arc::new(move || Box::new(CountingPolicy(c.clone()))));
        let c = counters;
        registry.register_producer(
            "test.producer",
            Arc::new(move || Box::new(CountingProducer(c.clone()))),
        );
        Arc::new(registry)
    }

    fn record(version: &str) -> FreshnessPolicyRecord {
        let mut record = FreshnessPolicyRecord::new("test.producer", "test.policy");
        record.record_version = version.to_string();
        record
    }

    fn selector() -> ColumnSelector {
        ColumnSelector::qualified("info", "name")
    }

    #[test]
    fn test_construction_is_memoized() {
        let counters = Arc::new(Counters::default());
        let cache = FreshenerCache::new(plugins(counters.clone()));
        let record = record("v1");

        let first = cache.get("user", &selector(), &record).unwrap();
        let second = cache.get("user", &selector(), &record).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counters.policy_setups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.producer_setups.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_version_change_rebuilds_and_cleans_up() {
        let counters = Arc::new(Counters::default());
        let cache = FreshenerCache::new(plugins(counters.clone()));

        cache.get("user", &selector(), &record("v1")).unwrap();
        let rebuilt = cache.get("user", &selector(), &record("v2")).unwrap();
        assert_eq!(rebuilt.record_version, "v2");
        assert_eq!(counters.policy_cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.policy_setups.load(Ordering::SeqCst), 2);
        // Same producer_ref, reinitialize_producer = false: the producer was
        // carried over without a second setup.
        assert_eq!(counters.producer_setups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.producer_cleanups.load(Ordering::SeqCst), 0);
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_reinitialize_producer_forces_fresh_setup() {
        let counters = Arc::new(Counters::default());
        let cache = FreshenerCache::new(plugins(counters.clone()));

        cache.get("user", &selector(), &record("v1")).unwrap();
        let mut updated = record("v2");
        updated.reinitialize_producer = true;
        cache.get("user", &selector(), &updated).unwrap();

        assert_eq!(counters.producer_setups.load(Ordering::SeqCst), 2);
        assert_eq!(counters.producer_cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_cleans_up_both_instances() {
        let counters = Arc::new(Counters::default());
        let cache = FreshenerCache::new(plugins(counters.clone()));

        cache.get("user", &selector(), &record("v1")).unwrap();
        cache.remove("user", &selector());

        assert_eq!(counters.policy_cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.producer_cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_plugin_surfaces_load_error() {
        let cache = FreshenerCache::new(Arc::new(PluginRegistry::new()));
        let result = cache.get("user", &selector(), &record("v1"));
        assert!(matches!(result, Err(FreshenerError::Plugin(_))));
    }

    #[test]
    fn test_concurrent_first_access_constructs_once() {
        let counters = Arc::new(Counters::default());
        let cache = Arc::new(FreshenerCache::new(plugins(counters.clone())));
        let record = record("v1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let record = record.clone();
            handles.push(std::thread::spawn(move || {
                cache.get("user", &selector(), &record).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.policy_setups.load(Ordering::SeqCst), 1);
        assert_eq!(counters.producer_setups.load(Ordering::SeqCst), 1);
    }
}
