//! `MessageSequencePromise`: an ordered, replayable stream of message promises.

use std::fmt;

use futures_util::stream::{BoxStream, StreamExt};

use miniagents_types::error::PromiseError;
use miniagents_types::message::Message;

use super::promise::MessagePromise;
use crate::promise::{PieceIter, StreamAppender, StreamedPromise};

fn collect(pieces: &[MessagePromise]) -> Result<Vec<MessagePromise>, PromiseError> {
    Ok(pieces.to_vec())
}

/// An ordered stream of message promises.
///
/// Every reader replays the same order from the first message.
#[derive(Clone)]
pub struct MessageSequencePromise {
    inner: StreamedPromise<MessagePromise, Vec<MessagePromise>>,
}

impl MessageSequencePromise {
    pub(crate) fn from_inner(inner: StreamedPromise<MessagePromise, Vec<MessagePromise>>) -> Self {
        Self { inner }
    }

    /// A pending sequence and the appender that feeds it.
    pub fn appender() -> (StreamAppender<MessagePromise>, Self) {
        let (appender, inner) = StreamedPromise::appender(collect);
        (appender, Self { inner })
    }

    /// A complete sequence with no messages.
    pub fn empty() -> Self {
        Self::from_messages(Vec::new())
    }

    /// A complete sequence of existing messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let promises = messages.into_iter().map(MessagePromise::ready).collect();
        Self {
            inner: StreamedPromise::ready(promises, collect),
        }
    }

    /// An already-failed sequence.
    pub fn failed(error: PromiseError) -> Self {
        Self {
            inner: StreamedPromise::failed(error, collect),
        }
    }

    /// A fresh cursor over the message promises.
    pub fn iter(&self) -> PieceIter<MessagePromise> {
        self.inner.iter()
    }

    /// Every message promise, once the sequence has finished.
    pub async fn message_promises(&self) -> Result<Vec<MessagePromise>, PromiseError> {
        self.inner.whole().await
    }

    /// Every message, fully resolved, in order.
    pub async fn messages(&self) -> Result<Vec<Message>, PromiseError> {
        let mut iter = self.iter();
        let mut messages = Vec::new();
        while let Some(promise) = iter.next().await {
            messages.push(promise?.message().await?);
        }
        Ok(messages)
    }

    /// Resolved messages as a `Stream`, ending with the first failure.
    pub fn message_stream(&self) -> BoxStream<'static, Result<Message, PromiseError>> {
        let mut iter = self.iter();
        async_stream::stream! {
            while let Some(promise) = iter.next().await {
                let message = match promise {
                    Ok(promise) => promise.message().await,
                    Err(err) => Err(err),
                };
                let failed = message.is_err();
                yield message;
                if failed {
                    break;
                }
            }
        }
        .boxed()
    }

    /// The texts of every message, in order.
    pub async fn texts(&self) -> Result<Vec<String>, PromiseError> {
        Ok(self
            .messages()
            .await?
            .into_iter()
            .map(|m| m.text().to_string())
            .collect())
    }

    /// Message promises cached so far. Does not start an on-demand producer.
    pub fn cached_len(&self) -> usize {
        self.inner.cached_len()
    }

    /// Whether both handles share one sequence.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl PartialEq for MessageSequencePromise {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MessageSequencePromise {}

impl fmt::Debug for MessageSequencePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageSequencePromise").field(&self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_sequence_resolves_to_nothing() {
        let seq = MessageSequencePromise::empty();
        assert!(seq.messages().await.unwrap().is_empty());
        assert!(seq.message_promises().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appender_feeds_every_reader() {
        let (appender, seq) = MessageSequencePromise::appender();
        appender.append(MessagePromise::ready(Message::new("one"))).unwrap();

        let mut first = seq.iter();
        assert!(first.next().await.unwrap().is_ok());

        appender.append(MessagePromise::ready(Message::new("two"))).unwrap();
        appender.complete();

        assert_eq!(seq.texts().await.unwrap(), vec!["one", "two"]);
        assert_eq!(seq.message_promises().await.unwrap().len(), 2);
        assert_eq!(first.position(), 1);
    }

    #[tokio::test]
    async fn failed_message_fails_messages() {
        let (appender, seq) = MessageSequencePromise::appender();
        appender.append(MessagePromise::ready(Message::new("fine"))).unwrap();
        appender
            .append(MessagePromise::failed(PromiseError::producer("broken token")))
            .unwrap();
        appender.complete();

        // The sequence itself completed; only the message failed.
        assert_eq!(seq.message_promises().await.unwrap().len(), 2);
        assert_eq!(seq.messages().await, Err(PromiseError::producer("broken token")));
    }

    #[tokio::test]
    async fn message_stream_stops_at_first_failure() {
        let (appender, seq) = MessageSequencePromise::appender();
        appender.append(MessagePromise::ready(Message::new("a"))).unwrap();
        appender.fail(PromiseError::producer("cut"));

        let items: Vec<_> = seq.message_stream().collect().await;
        assert_eq!(items, vec![Ok(Message::new("a")), Err(PromiseError::producer("cut"))]);
    }

    #[tokio::test]
    async fn failed_sequence() {
        let seq = MessageSequencePromise::failed(PromiseError::Cancelled);
        assert_eq!(seq.messages().await, Err(PromiseError::Cancelled));
    }
}
