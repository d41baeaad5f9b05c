//! Observability: structured logging, typed events, and counters.

mod events;
mod logger;
mod metrics;

pub use events::FreshEvent;
pub use logger::{Logger, Severity};
pub use metrics::FreshMetrics;
