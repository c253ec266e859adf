//! Message persistence port.
//!
//! - `persister` -- `MessagePersister` trait and its object-safe `MessagePersisterDyn` wrapper
//! - `memory` -- `InMemoryMessageStore`, a content-addressed store keyed by `hash_key`
//!
//! The run context calls every registered persister once per resolved message
//! (deduplicated by `hash_key`). Durable storage is the caller's concern.

pub mod memory;
pub mod persister;

pub use memory::InMemoryMessageStore;
pub use persister::{MessagePersister, MessagePersisterDyn};
