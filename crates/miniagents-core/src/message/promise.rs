//! `MessagePromise`: a streamed promise of text tokens whose whole is a `Message`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures_util::Stream;
use futures_util::stream::BoxStream;
use serde_json::Value;

use miniagents_types::error::PromiseError;
use miniagents_types::message::Message;

use crate::promise::{PieceIter, StreamAppender, StreamedPromise};
use crate::run::RunContext;

/// A message that may still be arriving token by token.
///
/// Token-by-token and whole-message reads observe the same resolution.
#[derive(Clone)]
pub struct MessagePromise {
    inner: StreamedPromise<String, Message>,
}

fn concat_with(
    metadata: BTreeMap<String, Value>,
) -> impl Fn(&[String]) -> Result<Message, PromiseError> + Send + Sync + 'static {
    move |tokens| Ok(Message::with_metadata(tokens.concat(), metadata.clone()))
}

impl MessagePromise {
    /// A promise of an existing message.
    ///
    /// The text is exposed as one token (none when empty) and the whole is
    /// exactly `message`, metadata included.
    pub fn ready(message: Message) -> Self {
        let tokens = if message.text().is_empty() {
            Vec::new()
        } else {
            vec![message.text().to_string()]
        };
        Self {
            inner: StreamedPromise::ready(tokens, move |_| Ok(message.clone())),
        }
    }

    /// A promise whose tokens come from `tokens`, concatenated into a message
    /// carrying `metadata`.
    pub fn streamed<S>(run: &RunContext, tokens: S, metadata: BTreeMap<String, Value>) -> Self
    where
        S: Stream<Item = Result<String, PromiseError>> + Send + 'static,
    {
        Self {
            inner: StreamedPromise::from_stream(run, tokens, concat_with(metadata)),
        }
    }

    /// A promise whose tokens are appended by `producer`.
    pub fn from_producer<F, Fut>(run: &RunContext, metadata: BTreeMap<String, Value>, producer: F) -> Self
    where
        F: FnOnce(StreamAppender<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PromiseError>> + Send + 'static,
    {
        Self {
            inner: StreamedPromise::new(run, producer, concat_with(metadata)),
        }
    }

    /// An already-failed promise.
    pub fn failed(error: PromiseError) -> Self {
        Self {
            inner: StreamedPromise::failed(error, concat_with(BTreeMap::new())),
        }
    }

    /// A fresh cursor over the tokens.
    pub fn tokens(&self) -> PieceIter<String> {
        self.inner.iter()
    }

    /// The tokens as a `Stream`.
    pub fn token_stream(&self) -> BoxStream<'static, Result<String, PromiseError>> {
        self.inner.stream()
    }

    /// The whole message.
    pub async fn message(&self) -> Result<Message, PromiseError> {
        self.inner.whole().await
    }

    /// Whether both handles share one resolution.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl From<Message> for MessagePromise {
    fn from(message: Message) -> Self {
        Self::ready(message)
    }
}

/// Two handles are equal when they share one resolution.
impl PartialEq for MessagePromise {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MessagePromise {}

impl fmt::Debug for MessagePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessagePromise").field(&self.inner).finish()
    }
}
