//! Observable freshening events
//!
//! Every log line names exactly one of these events.

use std::fmt;

/// Observable events in the freshening engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshEvent {
    // Registry
    /// A freshness policy was attached to a column or family.
    PolicyAttached,
    /// A freshness policy was removed.
    PolicyRemoved,

    // Instance cache
    /// A (policy, producer) pair was constructed and set up.
    FreshenerLoaded,
    /// A cached pair was evicted and cleaned up.
    FreshenerEvicted,
    /// Plugin resolution or setup failed.
    FreshenerLoadFailed,

    // Read path
    /// A producer task was scheduled.
    ProducerStarted,
    /// A producer completed and its value was written back.
    ProducerCompleted,
    /// A producer raised an error.
    ProducerFailed,
    /// The request deadline elapsed before a producer finished.
    DeadlineExpired,
    /// A request joined an already in-flight task for the same cell.
    DedupJoined,
    /// A stale column was not scheduled because the in-flight cap was hit.
    TaskDropped,
}

impl FreshEvent {
    /// Stable event name for structured logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshEvent::PolicyAttached => "policy_attached",
            FreshEvent::PolicyRemoved => "policy_removed",
            FreshEvent::FreshenerLoaded => "freshener_loaded",
            FreshEvent::FreshenerEvicted => "freshener_evicted",
            FreshEvent::FreshenerLoadFailed => "freshener_load_failed",
            FreshEvent::ProducerStarted => "producer_started",
            FreshEvent::ProducerCompleted => "producer_completed",
            FreshEvent::ProducerFailed => "producer_failed",
            FreshEvent::DeadlineExpired => "deadline_expired",
            FreshEvent::DedupJoined => "dedup_joined",
            FreshEvent::TaskDropped => "task_dropped",
        }
    }
}

impl fmt::Display for FreshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        assert_eq!(FreshEvent::PolicyAttached.as_str(), "policy_attached");
        assert_eq!(FreshEvent::ProducerCompleted.as_str(), "producer_completed");
        assert_eq!(FreshEvent::DeadlineExpired.as_str(), "deadline_expired");
    }
}
