//! Shared domain types for the MiniAgents runtime.
//!
//! This crate contains the value types used across the runtime: the immutable
//! content-addressed `Message`, runtime configuration, the promise error
//! taxonomy, and the events broadcast while agents run.
//!
//! No async or I/O dependencies: only serde, serde_json, sha2, uuid, chrono, and thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
