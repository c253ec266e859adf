//! Depth-first flattening of nested message inputs.
//!
//! Expansion happens inside one producer task per sequence: scalars become
//! ready message promises, collections are walked in order, deferred inputs
//! and nested sequences are awaited in place. Message promises are forwarded
//! as-is so their tokens keep streaming to readers.

use serde_json::Value;
use tracing::debug;

use miniagents_types::error::PromiseError;
use miniagents_types::message::Message;

use super::input::MessageInput;
use super::promise::MessagePromise;
use super::sequence::MessageSequencePromise;
use crate::promise::{StreamAppender, StreamedPromise};
use crate::run::RunContext;

/// Flatten `input` into one ordered sequence of message promises.
///
/// A `Sequence` input is returned unchanged. Anything else is expanded by a
/// producer task scheduled in `run`. A malformed item (a JSON number, say)
/// fails the sequence with `PromiseError::Flatten` after the messages that
/// preceded it.
pub fn flatten(run: &RunContext, input: impl Into<MessageInput>) -> MessageSequencePromise {
    match input.into() {
        MessageInput::Sequence(sequence) => sequence,
        input => {
            let scope = run.clone();
            MessageSequencePromise::from_inner(StreamedPromise::new(
                run,
                move |out| async move { expand(&scope, input, &out).await },
                |pieces: &[MessagePromise]| Ok(pieces.to_vec()),
            ))
        }
    }
}

/// Flatten every input appended to `raw`, in append order.
///
/// A failure recorded on `raw` becomes the failure of the result after
/// everything appended before it.
pub(crate) fn flatten_stream(
    run: &RunContext,
    raw: StreamedPromise<MessageInput, ()>,
) -> MessageSequencePromise {
    let scope = run.clone();
    MessageSequencePromise::from_inner(StreamedPromise::new(
        run,
        move |out| async move {
            let mut inputs = raw.iter();
            while let Some(input) = inputs.next().await {
                expand(&scope, input?, &out).await?;
            }
            Ok(())
        },
        |pieces: &[MessagePromise]| Ok(pieces.to_vec()),
    ))
}

async fn expand(
    run: &RunContext,
    input: MessageInput,
    out: &StreamAppender<MessagePromise>,
) -> Result<(), PromiseError> {
    let mut stack = vec![vec![input].into_iter()];
    while let Some(level) = stack.last_mut() {
        let Some(item) = level.next() else {
            stack.pop();
            continue;
        };
        match item {
            MessageInput::Text(text) => emit(run, out, MessagePromise::ready(Message::new(text)))?,
            MessageInput::Message(message) => emit(run, out, MessagePromise::ready(message))?,
            MessageInput::Promise(promise) => emit(run, out, promise)?,
            MessageInput::Json(Value::Null) => {}
            MessageInput::Json(Value::Array(items)) => {
                let items: Vec<_> = items.into_iter().map(MessageInput::Json).collect();
                stack.push(items.into_iter());
            }
            MessageInput::Json(value) => {
                let message = Message::from_json(value)?;
                emit(run, out, MessagePromise::ready(message))?;
            }
            MessageInput::Many(items) => stack.push(items.into_iter()),
            MessageInput::Sequence(sequence) => {
                let mut pieces = sequence.iter();
                while let Some(promise) = pieces.next().await {
                    emit(run, out, promise?)?;
                }
            }
            MessageInput::Deferred(deferred) => {
                let resolved = deferred.wait().await?;
                stack.push(vec![resolved].into_iter());
            }
        }
    }
    Ok(())
}

fn emit(
    run: &RunContext,
    out: &StreamAppender<MessagePromise>,
    promise: MessagePromise,
) -> Result<(), PromiseError> {
    run.track_message(&promise);
    out.append(promise)?;
    debug!("message flattened");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::promise::Promise;
    use miniagents_types::config::RuntimeConfig;

    fn promise_of(run: &RunContext, text: &'static str) -> MessageInput {
        MessageInput::Deferred(Promise::resolve(run, async move {
            tokio::task::yield_now().await;
            Ok(MessageInput::from(text))
        }))
    }

    #[tokio::test]
    async fn nested_input_flattens_in_order() {
        let run = RunContext::default();
        let input = MessageInput::Many(vec![
            "a".into(),
            vec!["b", "c"].into(),
            promise_of(&run, "d"),
        ]);
        let seq = flatten(&run, input);
        assert_eq!(seq.texts().await.unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn flattening_is_associative() {
        let run = RunContext::default();
        let inner = flatten(&run, vec!["b", "c"]);
        let nested = flatten(
            &run,
            MessageInput::Many(vec!["a".into(), inner.into(), MessageInput::Many(vec![vec!["d"].into()])]),
        );
        let flat = flatten(&run, vec!["a", "b", "c", "d"]);

        assert_eq!(nested.texts().await.unwrap(), flat.texts().await.unwrap());
    }

    #[tokio::test]
    async fn json_values_and_null() {
        let run = RunContext::default();
        let seq = flatten(
            &run,
            json!(["plain", {"text": "rich", "role": "user"}, null, [["deep"]]]),
        );
        let messages = seq.messages().await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["plain", "rich", "deep"]);
        assert_eq!(messages[1].meta("role"), Some(&json!("user")));
    }

    #[tokio::test]
    async fn malformed_item_fails_after_earlier_messages() {
        let run = RunContext::default();
        let seq = flatten(&run, json!(["ok", 42, "never"]));

        let mut iter = seq.iter();
        let first = iter.next().await.unwrap().unwrap();
        assert_eq!(first.message().await.unwrap().text(), "ok");
        let Some(Err(PromiseError::Flatten(reason))) = iter.next().await else {
            panic!("expected a flatten failure");
        };
        assert!(reason.contains("number"));
        assert_eq!(iter.next().await, None);
    }

    #[tokio::test]
    async fn sequence_input_passes_through() {
        let run = RunContext::default();
        let seq = MessageSequencePromise::from_messages(vec![Message::new("same")]);
        assert!(flatten(&run, seq.clone()).ptr_eq(&seq));
    }

    #[tokio::test]
    async fn failed_deferred_fails_sequence() {
        let run = RunContext::default();
        let deferred: Promise<MessageInput> = Promise::failed(PromiseError::agent("upstream", "boom"));
        let seq = flatten(&run, MessageInput::Many(vec!["first".into(), deferred.into()]));
        assert_eq!(seq.messages().await, Err(PromiseError::agent("upstream", "boom")));
        assert_eq!(seq.cached_len(), 1);
    }

    #[tokio::test]
    async fn streamed_promise_is_forwarded_not_copied() {
        let run = RunContext::default();
        let (tokens, promise) = StreamedPromise::<String, String>::appender(|t| Ok(t.concat()));
        let message = MessagePromise::from_producer(&run, Default::default(), move |out| async move {
            let mut iter = promise.iter();
            while let Some(token) = iter.next().await {
                out.append(token?)?;
            }
            Ok(())
        });
        let seq = flatten(&run, MessageInput::Promise(message.clone()));

        let mut iter = seq.iter();
        let forwarded = iter.next().await.unwrap().unwrap();
        assert!(forwarded.ptr_eq(&message));

        tokens.append("str".to_string()).unwrap();
        tokens.append("eam".to_string()).unwrap();
        tokens.complete();
        assert_eq!(forwarded.message().await.unwrap().text(), "stream");
    }

    #[tokio::test]
    async fn on_demand_flatten_waits_for_reader() {
        let run = RunContext::new(RuntimeConfig::on_demand());
        let seq = flatten(&run, vec!["lazy"]);
        tokio::task::yield_now().await;
        assert_eq!(seq.cached_len(), 0);
        assert_eq!(seq.texts().await.unwrap(), vec!["lazy"]);
    }

    #[tokio::test]
    async fn flatten_stream_follows_raw_failure() {
        let run = RunContext::default();
        let (raw_in, raw) = StreamedPromise::<MessageInput, ()>::appender(|_| Ok(()));
        let seq = flatten_stream(&run, raw);
        raw_in.append(vec!["x", "y"].into()).unwrap();
        raw_in.fail(PromiseError::agent("writer", "stopped"));

        let mut iter = seq.iter();
        assert!(iter.next().await.unwrap().is_ok());
        assert!(iter.next().await.unwrap().is_ok());
        assert_eq!(iter.next().await, Some(Err(PromiseError::agent("writer", "stopped"))));
    }
}
