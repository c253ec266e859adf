//! Observability setup for MiniAgents binaries.
//!
//! Library crates only emit `tracing` events and spans; installing a
//! subscriber is left to the binary, through [`tracing_setup`].

pub mod tracing_setup;

pub use tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
