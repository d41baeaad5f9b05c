//! freshdb - read-time freshening for sparse, column-oriented row stores
//!
//! Reads consult per-column freshness policies; stale cells are recomputed
//! by pluggable producers under a shared latency budget and written back for
//! later reads.

pub mod column;
pub mod coordinator;
pub mod freshener;
pub mod layout;
pub mod observability;
pub mod plugin;
pub mod registry;
pub mod store;
pub mod validation;
