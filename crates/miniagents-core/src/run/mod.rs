//! Run context.
//!
//! Owns the lifetime of every producer and agent task: spawning, cancellation,
//! draining, persistence hooks, and error reporting.

pub mod context;

pub use context::{ErrorHandler, ErrorReport, RunContext, RunContextBuilder};
