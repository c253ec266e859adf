//! `Agent`: a named async body, scheduled eagerly on every invocation.
//!
//! Each `inquire` creates one interaction: the input is flattened into an
//! inbound sequence, the body runs as a task of the run context, and its
//! replies are flattened into the outbound sequence returned to the caller.
//! The caller never sees the body's errors directly; they arrive as the
//! failure of the outbound sequence (or as a trailing error message when
//! `errors_as_messages` is set).

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use miniagents_types::error::PromiseError;
use miniagents_types::event::RuntimeEvent;
use miniagents_types::message::Message;

use super::call::AgentCall;
use super::function::AgentFunction;
use super::interaction::{InteractionContext, ReplySink};
use crate::message::{MessageInput, MessageSequencePromise, flatten, flatten_stream};
use crate::promise::{StreamAppender, StreamedPromise, panic_message};
use crate::run::{ErrorReport, RunContext};

#[derive(Clone)]
struct AgentInner {
    name: Arc<str>,
    description: String,
    options: Map<String, Value>,
    func: Arc<dyn AgentFunction>,
}

/// A named, stateless-between-invocations agent.
///
/// Cloning is cheap and shares the body.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Create an agent from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_body(name, func)
    }

    /// Create an agent from any [`AgentFunction`].
    pub fn from_body(name: impl Into<String>, func: impl AgentFunction) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                name: Arc::from(name.into()),
                description: String::new(),
                options: Map::new(),
                func: Arc::new(func),
            }),
        }
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).description = description.into();
        self
    }

    /// Add a default option, overridable per call.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.inner)
            .options
            .insert(key.into(), value.into());
        self
    }

    /// A renamed copy sharing this body, with `options` layered over the defaults.
    pub fn fork(&self, name: impl Into<String>, options: Map<String, Value>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.name = Arc::from(name.into());
        inner.options.extend(options);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Default options.
    pub fn options(&self) -> &Map<String, Value> {
        &self.inner.options
    }

    /// Invoke the agent with `input` and return its outbound sequence.
    pub fn inquire(&self, run: &RunContext, input: impl Into<MessageInput>) -> MessageSequencePromise {
        self.inquire_with(run, input, Map::new())
    }

    /// Like [`inquire`](Self::inquire), with per-call options merged over the defaults.
    pub fn inquire_with(
        &self,
        run: &RunContext,
        input: impl Into<MessageInput>,
        options: Map<String, Value>,
    ) -> MessageSequencePromise {
        let inbound = flatten(run, input);
        self.start_interaction(run, inbound, options)
    }

    /// Start an invocation whose input is sent incrementally.
    pub fn initiate(&self, run: &RunContext) -> AgentCall {
        self.initiate_with(run, Map::new())
    }

    /// Like [`initiate`](Self::initiate), with per-call options.
    pub fn initiate_with(&self, run: &RunContext, options: Map<String, Value>) -> AgentCall {
        let (input, raw) = StreamedPromise::<MessageInput, ()>::appender(|_| Ok(()));
        let inbound = flatten_stream(run, raw);
        let reply = self.start_interaction(run, inbound, options);
        AgentCall::new(input, reply)
    }

    fn start_interaction(
        &self,
        run: &RunContext,
        inbound: MessageSequencePromise,
        options: Map<String, Value>,
    ) -> MessageSequencePromise {
        let mut merged = self.inner.options.clone();
        merged.extend(options);
        let interaction_id = Uuid::now_v7();
        debug!(agent = %self.inner.name, %interaction_id, "agent scheduled");

        let agent = self.clone();
        let scope = run.clone();
        let raw = StreamedPromise::<MessageInput, ()>::new(
            run,
            move |out| agent.drive(scope, interaction_id, Arc::new(merged), inbound, out),
            |_| Ok(()),
        );
        flatten_stream(run, raw)
    }

    async fn drive(
        self,
        run: RunContext,
        interaction_id: Uuid,
        options: Arc<Map<String, Value>>,
        inbound: MessageSequencePromise,
        out: StreamAppender<MessageInput>,
    ) -> Result<(), PromiseError> {
        let name = Arc::clone(&self.inner.name);
        let span = info_span!("agent", agent = %name, %interaction_id);

        async move {
            let ctx = InteractionContext::new(
                Arc::clone(&name),
                interaction_id,
                options,
                inbound,
                ReplySink::new(&out),
                run.clone(),
            );
            let started = Instant::now();
            run.events().publish(RuntimeEvent::AgentStarted {
                agent: name.to_string(),
                interaction_id,
                at: Utc::now(),
            });
            debug!("agent started");

            let error = match AssertUnwindSafe(self.inner.func.call(ctx)).catch_unwind().await {
                Ok(Ok(())) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(duration_ms, "agent completed");
                    run.events().publish(RuntimeEvent::AgentCompleted {
                        agent: name.to_string(),
                        interaction_id,
                        duration_ms,
                    });
                    return Ok(());
                }
                Ok(Err(err)) => into_promise_error(&name, err),
                Err(payload) => PromiseError::agent(&*name, panic_message(payload)),
            };

            let as_message = run.config().errors_as_messages;
            warn!(error = %error, as_message, "agent failed");
            run.report_error(&ErrorReport::Agent {
                agent: &name,
                interaction_id,
                error: &error,
            });
            run.events().publish(RuntimeEvent::AgentFailed {
                agent: name.to_string(),
                interaction_id,
                error: error.to_string(),
                as_message,
            });

            if as_message {
                out.append(MessageInput::Message(Message::error(error.to_string())))?;
                Ok(())
            } else {
                Err(error)
            }
        }
        .instrument(span)
        .await
    }
}

/// Upstream promise failures pass through unchanged; anything else is
/// attributed to the agent.
fn into_promise_error(agent: &str, err: anyhow::Error) -> PromiseError {
    match err.downcast::<PromiseError>() {
        Ok(upstream) => upstream,
        Err(err) => PromiseError::agent(agent, format!("{err:#}")),
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.name)
            .field("description", &self.inner.description)
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use miniagents_types::config::RuntimeConfig;

    fn echo() -> Agent {
        Agent::new("echo", |ctx: InteractionContext| async move {
            for message in ctx.messages().messages().await? {
                ctx.reply(format!("You said: {}", message.text()))?;
            }
            Ok(())
        })
    }

    fn failing() -> Agent {
        Agent::new("failing", |_ctx: InteractionContext| async move {
            anyhow::bail!("model unavailable")
        })
    }

    #[tokio::test]
    async fn inquire_returns_replies() {
        let run = RunContext::default();
        let out = echo().inquire(&run, vec!["Hello", "World"]);
        assert_eq!(
            out.texts().await.unwrap(),
            vec!["You said: Hello", "You said: World"]
        );
    }

    #[tokio::test]
    async fn body_starts_without_reader() {
        let run = RunContext::default();
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let agent = Agent::new("eager", move |_ctx: InteractionContext| {
            let s = Arc::clone(&s);
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let _unread = agent.inquire(&run, "ping");
        run.finish().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_demand_body_waits_for_reader() {
        let run = RunContext::new(RuntimeConfig::on_demand());
        let started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&started);
        let agent = Agent::new("lazy", move |ctx: InteractionContext| {
            let s = Arc::clone(&s);
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                ctx.reply("awake")?;
                Ok(())
            }
        });

        let out = agent.inquire(&run, "ping");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        assert_eq!(out.texts().await.unwrap(), vec!["awake"]);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn body_error_fails_outbound_after_earlier_replies() {
        let run = RunContext::default();
        let agent = Agent::new("partial", |ctx: InteractionContext| async move {
            ctx.reply("first")?;
            anyhow::bail!("second step failed")
        });

        let out = agent.inquire(&run, MessageInput::empty());
        let mut iter = out.iter();
        let first = iter.next().await.unwrap().unwrap();
        assert_eq!(first.message().await.unwrap().text(), "first");
        assert_eq!(
            iter.next().await,
            Some(Err(PromiseError::agent("partial", "second step failed")))
        );
    }

    #[tokio::test]
    async fn panic_is_captured_as_agent_error() {
        let run = RunContext::default();
        let agent = Agent::new("panicky", |_ctx: InteractionContext| async move {
            if true {
                panic!("index out of range");
            }
            Ok(())
        });
        assert_eq!(
            agent.inquire(&run, "x").messages().await,
            Err(PromiseError::agent("panicky", "panicked: index out of range"))
        );
    }

    #[tokio::test]
    async fn errors_as_messages_completes_sequence() {
        let run = RunContext::builder().errors_as_messages(true).build();
        let messages = failing().inquire(&run, "x").messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_error());
        assert!(messages[0].text().contains("model unavailable"));
    }

    #[tokio::test]
    async fn failure_is_reported_and_published() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&reports);
        let run = RunContext::builder()
            .on_error(move |report| {
                if let ErrorReport::Agent { agent, error, .. } = report {
                    r.lock().unwrap().push((agent.to_string(), (*error).clone()));
                }
            })
            .build();
        let mut events = run.events().subscribe();

        let _ = failing().inquire(&run, "x").messages().await;

        assert_eq!(
            *reports.lock().unwrap(),
            vec![(
                "failing".to_string(),
                PromiseError::agent("failing", "model unavailable")
            )]
        );
        assert!(matches!(events.recv().await.unwrap(), RuntimeEvent::AgentStarted { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            RuntimeEvent::AgentFailed { as_message: false, .. }
        ));
    }

    #[tokio::test]
    async fn upstream_failure_passes_through_unchanged() {
        let run = RunContext::default();
        let upstream = failing().inquire(&run, "x");
        let downstream = echo().inquire(&run, upstream);
        assert_eq!(
            downstream.messages().await,
            Err(PromiseError::agent("failing", "model unavailable"))
        );
    }

    #[tokio::test]
    async fn options_merge_and_fork() {
        let run = RunContext::default();
        let agent = Agent::new("opts", |ctx: InteractionContext| async move {
            let model = ctx.option("model").cloned().unwrap_or(Value::Null);
            let temp = ctx.option("temperature").cloned().unwrap_or(Value::Null);
            ctx.reply(format!("{model} {temp}"))?;
            Ok(())
        })
        .describe("reports its options")
        .with_option("model", "small")
        .with_option("temperature", 0.1);

        let mut per_call = Map::new();
        per_call.insert("temperature".to_string(), json!(0.9));
        let out = agent.inquire_with(&run, MessageInput::empty(), per_call);
        assert_eq!(out.texts().await.unwrap(), vec!["\"small\" 0.9"]);

        let mut fork_opts = Map::new();
        fork_opts.insert("model".to_string(), json!("large"));
        let forked = agent.fork("opts-large", fork_opts);
        assert_eq!(forked.name(), "opts-large");
        assert_eq!(forked.description(), "reports its options");
        assert_eq!(agent.options()["model"], json!("small"));
        let out = forked.inquire(&run, MessageInput::empty());
        assert_eq!(out.texts().await.unwrap(), vec!["\"large\" 0.1"]);
    }

    struct Shout;

    impl AgentFunction for Shout {
        fn call(&self, ctx: InteractionContext) -> futures_util::future::BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async move {
                for text in ctx.messages().texts().await? {
                    ctx.reply(text.to_uppercase())?;
                }
                Ok::<(), anyhow::Error>(())
            })
        }
    }

    #[tokio::test]
    async fn struct_body() {
        let run = RunContext::default();
        let out = Agent::from_body("shout", Shout).inquire(&run, "quiet");
        assert_eq!(out.texts().await.unwrap(), vec!["QUIET"]);
    }

    #[tokio::test]
    async fn interactions_are_independent() {
        let run = RunContext::default();
        let agent = echo();
        let a = agent.inquire(&run, "one");
        let b = agent.inquire(&run, "two");
        assert_eq!(a.texts().await.unwrap(), vec!["You said: one"]);
        assert_eq!(b.texts().await.unwrap(), vec!["You said: two"]);
    }

    #[tokio::test]
    async fn cancellation_reaches_reader() {
        let run = RunContext::default();
        let agent = Agent::new("stuck", |ctx: InteractionContext| async move {
            ctx.reply("before")?;
            std::future::pending::<()>().await;
            Ok(())
        });
        let out = agent.inquire(&run, MessageInput::empty());
        let mut iter = out.iter();
        assert!(iter.next().await.unwrap().is_ok());

        run.shutdown().await;
        assert_eq!(iter.next().await, Some(Err(PromiseError::Cancelled)));
    }
}
