//! In-memory content-addressed message store.
//!
//! `InMemoryMessageStore` is backed by `DashMap`, keyed by `hash_key`, and
//! remembers arrival order. Cloning produces a shared view of the same data,
//! so a caller can keep a handle after registering it with a run context.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use miniagents_types::message::Message;

use super::persister::MessagePersister;
use crate::promise::lock;
use crate::run::RunContext;

#[derive(Debug, Default)]
struct StoreInner {
    messages: DashMap<String, Message>,
    order: Mutex<Vec<String>>,
}

/// Content-addressed message store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageStore {
    inner: Arc<StoreInner>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message. Returns `false` if its `hash_key` was already stored.
    pub fn insert(&self, message: &Message) -> bool {
        if self.inner.messages.contains_key(message.hash_key()) {
            return false;
        }
        let key = message.hash_key().to_string();
        if self.inner.messages.insert(key.clone(), message.clone()).is_some() {
            return false;
        }
        lock(&self.inner.order).push(key);
        true
    }

    /// A cloned copy of the message with this `hash_key`.
    pub fn get(&self, hash_key: &str) -> Option<Message> {
        self.inner.messages.get(hash_key).map(|r| r.value().clone())
    }

    /// Whether a message with this `hash_key` is stored.
    pub fn contains(&self, hash_key: &str) -> bool {
        self.inner.messages.contains_key(hash_key)
    }

    /// All stored messages in arrival order.
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.order)
            .iter()
            .filter_map(|key| self.get(key))
            .collect()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.messages.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.messages.is_empty()
    }
}

impl MessagePersister for InMemoryMessageStore {
    async fn persist(&self, _run: &RunContext, message: &Message) -> anyhow::Result<()> {
        self.insert(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_dedupes_by_hash_key() {
        let store = InMemoryMessageStore::new();
        assert!(store.insert(&Message::new("hi")));
        assert!(!store.insert(&Message::new("hi")));
        assert!(store.insert(&Message::new("there")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn messages_keep_arrival_order() {
        let store = InMemoryMessageStore::new();
        for text in ["c", "a", "b"] {
            store.insert(&Message::new(text));
        }
        let texts: Vec<_> = store.messages().iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, vec!["c", "a", "b"]);
    }

    #[test]
    fn clone_shares_storage() {
        let store = InMemoryMessageStore::new();
        let view = store.clone();
        let msg = Message::new("shared");
        store.insert(&msg);
        assert!(view.contains(msg.hash_key()));
        assert_eq!(view.get(msg.hash_key()), Some(msg));
    }

    #[tokio::test]
    async fn persist_inserts() {
        let run = RunContext::default();
        let store = InMemoryMessageStore::new();
        store.persist(&run, &Message::new("kept")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}
