//! Two agents taking turns.
//!
//! The user agent speaks first, receiving the assistant's previous reply
//! (nothing on the first turn). The assistant answers either the latest user
//! turn or the whole history. Every turn is appended to a history supplied
//! by the caller.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use miniagents_types::error::PromiseError;
use miniagents_types::message::Message;

use super::settle;
use crate::agent::Agent;
use crate::promise::lock;
use crate::run::RunContext;

/// Where dialog turns accumulate.
pub trait DialogHistory: Send + Sync {
    /// Record the messages `speaker` produced in one turn.
    fn append(&self, speaker: &str, messages: &[Message]);

    /// Every recorded message, oldest first.
    fn messages(&self) -> Vec<Message>;
}

/// History kept in memory. Clones share the same entries.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    entries: Arc<Mutex<Vec<(String, Message)>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message with the speaker that produced it.
    pub fn entries(&self) -> Vec<(String, Message)> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl DialogHistory for InMemoryHistory {
    fn append(&self, speaker: &str, messages: &[Message]) {
        lock(&self.entries).extend(
            messages
                .iter()
                .map(|message| (speaker.to_string(), message.clone())),
        );
    }

    fn messages(&self) -> Vec<Message> {
        lock(&self.entries)
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl fmt::Debug for InMemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHistory")
            .field("len", &self.len())
            .finish()
    }
}

/// Dialog settings.
#[derive(Clone)]
pub struct DialogOptions {
    /// Stop after this many assistant turns. `None` runs until the user is silent.
    pub max_turns: Option<usize>,
    /// Where turns are recorded.
    pub history: Arc<dyn DialogHistory>,
    /// Give the assistant the whole history instead of the latest user turn.
    pub feed_history: bool,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            max_turns: None,
            history: Arc::new(InMemoryHistory::new()),
            feed_history: false,
        }
    }
}

impl fmt::Debug for DialogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogOptions")
            .field("max_turns", &self.max_turns)
            .field("feed_history", &self.feed_history)
            .finish()
    }
}

/// How a dialog ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogOutcome {
    /// Completed assistant turns.
    pub turns: usize,
    /// The assistant's last reply, empty if it never spoke.
    pub last_reply: Vec<Message>,
}

/// Alternate `user` and `assistant` turns until the user produces no
/// messages, `max_turns` is reached, a turn fails, or `run` is cancelled.
pub async fn dialog(
    run: &RunContext,
    user: &Agent,
    assistant: &Agent,
    options: DialogOptions,
) -> Result<DialogOutcome, PromiseError> {
    let history = options.history;
    let mut turns = 0;
    let mut last_reply = Vec::new();

    while options.max_turns.is_none_or(|max| turns < max) {
        let user_turn = settle(run, &user.inquire(run, last_reply.clone())).await?;
        if user_turn.is_empty() {
            debug!(turns, "user has nothing more to say");
            break;
        }
        history.append(user.name(), &user_turn);

        let assistant_input = if options.feed_history {
            history.messages()
        } else {
            user_turn
        };
        let reply = settle(run, &assistant.inquire(run, assistant_input)).await?;
        history.append(assistant.name(), &reply);

        last_reply = reply;
        turns += 1;
        debug!(turns, "dialog turn finished");
    }

    info!(user = user.name(), assistant = assistant.name(), turns, "dialog finished");
    Ok(DialogOutcome { turns, last_reply })
}
