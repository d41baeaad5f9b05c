//! Pluggable freshness capabilities
//!
//! Two capability interfaces drive freshening: a `FreshnessPolicy` decides
//! whether a stored value is still valid, and a `Producer` computes a
//! replacement for a stale one. Implementations are resolved by reference
//! string through a `PluginRegistry` populated at process startup; an
//! unknown reference is a load error, surfaced to whichever request first
//! constructs the instance.

mod errors;
pub mod stock;

pub use errors::{PluginError, PluginResult, ProducerError};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::column::ColumnSelector;
use crate::freshener::{FreshenerContext, FreshenerSetupContext};
use crate::store::RowData;

/// Pluggable staleness predicate.
///
/// `is_fresh` runs synchronously on the request path and must not block on
/// network or disk.
pub trait FreshnessPolicy: Send + Sync {
    /// Load serialized policy state and attachment parameters. Called once,
    /// before `setup`.
    fn load(&mut self, _state: &[u8], _parameters: &BTreeMap<String, String>) -> PluginResult<()> {
        Ok(())
    }

    /// One-time initialization, amortized across requests.
    fn setup(&mut self, _ctx: &FreshenerSetupContext) -> PluginResult<()> {
        Ok(())
    }

    /// Release resources on eviction or shutdown.
    fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Whether the currently stored data is still fresh for this request.
    fn is_fresh(&self, row: &RowData, ctx: &FreshenerContext) -> bool;
}

/// Pluggable recomputation function for a stale column.
pub trait Producer: Send + Sync {
    /// Columns the producer reads to compute its output.
    fn required_columns(&self) -> BTreeSet<ColumnSelector>;

    /// One-time initialization, amortized across requests.
    fn setup(&mut self, _ctx: &FreshenerSetupContext) -> PluginResult<()> {
        Ok(())
    }

    /// Release resources on eviction or shutdown.
    fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Compute the replacement value for the stale column.
    fn produce(&self, row: &RowData, ctx: &FreshenerContext) -> Result<Value, ProducerError>;
}

/// Factory for policy instances.
pub type PolicyFactory = Arc<dyn Fn() -> Box<dyn FreshnessPolicy> + Send + Sync>;

/// Factory for producer instances.
pub type ProducerFactory = Arc<dyn Fn() -> Box<dyn Producer> + Send + Sync>;

/// Registry mapping reference strings to policy and producer factories.
#[derive(Default)]
pub struct PluginRegistry {
    policies: RwLock<HashMap<String, PolicyFactory>>,
    producers: RwLock<HashMap<String, ProducerFactory>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the stock policies registered.
    pub fn with_stock() -> Self {
        let registry = Self::new();
        stock::register(&registry);
        registry
    }

    /// Register a policy factory under a reference string.
    pub fn register_policy(&self, reference: impl Into<String>, factory: PolicyFactory) {
        if let Ok(mut policies) = self.policies.write() {
            policies.insert(reference.into(), factory);
        }
    }

    /// Register a producer factory under a reference string.
    pub fn register_producer(&self, reference: impl Into<String>, factory: ProducerFactory) {
        if let Ok(mut producers) = self.producers.write() {
            producers.insert(reference.into(), factory);
        }
    }

    /// Construct a policy instance for the reference.
    pub fn new_policy(&self, reference: &str) -> PluginResult<Box<dyn FreshnessPolicy>> {
        let policies = self
            .policies
            .read()
            .map_err(|_| PluginError::Internal("Lock poisoned".into()))?;
        let factory = policies
            .get(reference)
            .ok_or_else(|| PluginError::UnknownPolicy(reference.to_string()))?;
        Ok(factory())
    }

    /// Construct a producer instance for the reference.
    pub fn new_producer(&self, reference: &str) -> PluginResult<Box<dyn Producer>> {
        let producers = self
            .producers
            .read()
            .map_err(|_| PluginError::Internal("Lock poisoned".into()))?;
        let factory = producers
            .get(reference)
            .ok_or_else(|| PluginError::UnknownProducer(reference.to_string()))?;
        Ok(factory())
    }
}
