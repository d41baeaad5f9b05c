//! Freshener contexts and instance cache

mod cache;
mod context;
mod errors;

pub use cache::{Freshener, FreshenerCache};
pub use context::{FreshenerContext, FreshenerSetupContext};
pub use errors::{FreshenerError, FreshenerResult};
