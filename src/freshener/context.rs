//! Freshener contexts
//!
//! Two lifetimes: `FreshenerSetupContext` lives as long as a loaded
//! (policy, producer) pair and amortizes one-time initialization;
//! `FreshenerContext` lives for one column decision within one client
//! request.

use std::collections::BTreeMap;

use crate::column::ColumnSelector;
use crate::store::DataRequest;

/// Long-lived context for a loaded (policy, producer) pair. Created on first
/// load, destroyed on eviction or shutdown.
#[derive(Debug, Clone)]
pub struct FreshenerSetupContext {
    /// Table the pair is attached to.
    pub table: String,
    /// Attached selector (column or family).
    pub attachment: ColumnSelector,
    /// Attachment parameters from the policy record.
    pub parameters: BTreeMap<String, String>,
    /// Version of the record the pair was built from.
    pub record_version: String,
}

/// Short-lived context for one column decision within one client request.
#[derive(Debug, Clone)]
pub struct FreshenerContext {
    /// Table being read.
    pub table: String,
    /// The concrete column being decided (always qualified on the read
    /// path).
    pub column: ColumnSelector,
    /// The attached selector that matched this column; equals `column` for
    /// qualified attachments, the family selector for family attachments.
    pub attachment: ColumnSelector,
    /// The client's original data request.
    pub client_request: DataRequest,
    /// Attachment parameters from the policy record.
    pub parameters: BTreeMap<String, String>,
}
