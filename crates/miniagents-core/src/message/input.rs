//! `MessageInput`: everything that can be turned into a message sequence.

use serde_json::Value;

use miniagents_types::message::Message;

use super::promise::MessagePromise;
use super::sequence::MessageSequencePromise;
use crate::promise::Promise;

/// A possibly nested, possibly still-pending collection of messages.
///
/// `flatten` expands it depth-first into a `MessageSequencePromise`.
#[derive(Clone, Debug)]
pub enum MessageInput {
    /// Plain text.
    Text(String),
    /// A JSON string, object, array, or `null`.
    Json(Value),
    /// A resolved message.
    Message(Message),
    /// A message that may still be streaming.
    Promise(MessagePromise),
    /// A sequence, forwarded piece by piece.
    Sequence(MessageSequencePromise),
    /// Several inputs, expanded in order.
    Many(Vec<MessageInput>),
    /// An input that is not known yet.
    Deferred(Promise<MessageInput>),
}

impl MessageInput {
    /// An input that contributes no messages.
    pub fn empty() -> Self {
        Self::Many(Vec::new())
    }
}

impl Default for MessageInput {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&str> for MessageInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Message> for MessageInput {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<MessagePromise> for MessageInput {
    fn from(promise: MessagePromise) -> Self {
        Self::Promise(promise)
    }
}

impl From<MessageSequencePromise> for MessageInput {
    fn from(sequence: MessageSequencePromise) -> Self {
        Self::Sequence(sequence)
    }
}

impl From<Value> for MessageInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Promise<MessageInput>> for MessageInput {
    fn from(promise: Promise<MessageInput>) -> Self {
        Self::Deferred(promise)
    }
}

impl<T: Into<MessageInput>> From<Vec<T>> for MessageInput {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MessageInput>, const N: usize> From<[T; N]> for MessageInput {
    fn from(items: [T; N]) -> Self {
        Self::Many(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MessageInput>> From<Option<T>> for MessageInput {
    fn from(item: Option<T>) -> Self {
        item.map_or_else(Self::empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversions_pick_variants() {
        assert!(matches!(MessageInput::from("hi"), MessageInput::Text(t) if t == "hi"));
        assert!(matches!(MessageInput::from(json!({"text": "x"})), MessageInput::Json(_)));
        assert!(matches!(MessageInput::from(Message::new("m")), MessageInput::Message(_)));
        assert!(matches!(
            MessageInput::from(MessageSequencePromise::empty()),
            MessageInput::Sequence(_)
        ));
    }

    #[test]
    fn collections_become_many() {
        let input = MessageInput::from(vec!["a", "b"]);
        let MessageInput::Many(items) = input else {
            panic!("expected Many");
        };
        assert_eq!(items.len(), 2);

        let input = MessageInput::from(["x", "y", "z"]);
        assert!(matches!(input, MessageInput::Many(items) if items.len() == 3));
    }

    #[test]
    fn none_is_empty() {
        let input = MessageInput::from(None::<String>);
        assert!(matches!(input, MessageInput::Many(items) if items.is_empty()));
        assert!(matches!(MessageInput::default(), MessageInput::Many(items) if items.is_empty()));
    }
}
