//! Persisted policy-attachment record

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One policy attachment, as persisted by the registry.
///
/// `record_version` is stamped by the registry on every successful store; a
/// changed version is what evicts cached freshener instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicyRecord {
    /// Unique version of this record, refreshed on every store.
    #[serde(default)]
    pub record_version: String,

    /// Identifier of the producer implementation to load.
    pub producer_ref: String,

    /// Identifier of the policy implementation to load.
    pub policy_ref: String,

    /// Serialized policy state (e.g. a shelf-life duration), opaque to the
    /// registry.
    #[serde(default)]
    pub policy_state: Vec<u8>,

    /// Free-form parameters forwarded to the policy and producer per request.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Whether a record change forces producer setup to rerun even when the
    /// producer reference is unchanged.
    #[serde(default)]
    pub reinitialize_producer: bool,
}

impl FreshnessPolicyRecord {
    /// Create a record with empty state, no parameters, and
    /// `reinitialize_producer = false`.
    pub fn new(producer_ref: impl Into<String>, policy_ref: impl Into<String>) -> Self {
        Self {
            record_version: String::new(),
            producer_ref: producer_ref.into(),
            policy_ref: policy_ref.into(),
            policy_state: Vec::new(),
            parameters: BTreeMap::new(),
            reinitialize_producer: false,
        }
    }

    /// Attach serialized policy state.
    pub fn with_state(mut self, state: Vec<u8>) -> Self {
        self.policy_state = state;
        self
    }

    /// Attach request parameters.
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the producer-reinitialization flag.
    pub fn with_reinitialize_producer(mut self, reinitialize: bool) -> Self {
        self.reinitialize_producer = reinitialize;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let record = FreshnessPolicyRecord::new("acme.producer", "acme.policy");
        assert!(record.record_version.is_empty());
        assert!(record.policy_state.is_empty());
        assert!(record.parameters.is_empty());
        assert!(!record.reinitialize_producer);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut params = BTreeMap::new();
        params.insert("test-key".to_string(), "test-value".to_string());

        let record = FreshnessPolicyRecord::new("acme.producer", "acme.policy")
            .with_state(b"{\"shelf_life_ms\":100}".to_vec())
            .with_parameters(params)
            .with_reinitialize_producer(true);

        let json = serde_json::to_string(&record).unwrap();
        let back: FreshnessPolicyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
