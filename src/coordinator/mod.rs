//! Freshening coordinator: the per-request read path.

mod errors;
mod reader;
mod result;

pub use errors::{FreshError, FreshResult};
pub use reader::{FreshReader, FreshReaderConfig};
pub use result::{Diagnostic, FreshRowResult, FreshnessDecision};
