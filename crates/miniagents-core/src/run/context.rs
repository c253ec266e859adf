//! Run context: the scoped lifecycle for every task spawned during one run.
//!
//! `RunContext` bundles what flows through a run: configuration, the
//! cancellation token, the task tracker, the event bus, registered persisters,
//! and the error handler. Every producer and agent task is spawned through it
//! and raced against its cancellation token, so tearing down the context
//! cancels outstanding work and every consumer observes `Cancelled`.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use miniagents_types::config::{RuntimeConfig, SchedulingMode};
use miniagents_types::error::PromiseError;
use miniagents_types::event::RuntimeEvent;
use miniagents_types::message::Message;

use crate::event::EventBus;
use crate::message::MessagePromise;
use crate::persist::{MessagePersister, MessagePersisterDyn};
use crate::promise::{DeferredStart, lock};

/// A failure reported to the run context's error handler.
#[derive(Debug)]
pub enum ErrorReport<'a> {
    /// An agent body returned an error or panicked.
    Agent {
        agent: &'a str,
        interaction_id: Uuid,
        error: &'a PromiseError,
    },
    /// A persister failed to record a message.
    Persist {
        message: &'a Message,
        error: &'a anyhow::Error,
    },
}

/// Callback invoked for every reported failure.
pub type ErrorHandler = Arc<dyn Fn(&ErrorReport<'_>) + Send + Sync>;

struct RunInner {
    run_id: Uuid,
    config: RuntimeConfig,
    cancellation: CancellationToken,
    tracker: TaskTracker,
    events: EventBus,
    persisters: Vec<Arc<dyn MessagePersisterDyn>>,
    persisted: DashSet<String>,
    error_handler: Option<ErrorHandler>,
    deferred: Mutex<Vec<Weak<DeferredStart>>>,
}

/// Shared execution scope for promises and agents.
///
/// Cloning produces another handle onto the same scope.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<RunInner>,
}

impl RunContext {
    /// Create a context with the given configuration and no hooks.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a context with hooks.
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::default()
    }

    /// Run `body` in a fresh context, then wait for every task it spawned.
    pub async fn run<F, Fut, T>(config: RuntimeConfig, body: F) -> T
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let run = Self::new(config);
        run.scoped(body).await
    }

    /// Run `body` with this context, then wait for every task it spawned.
    pub async fn scoped<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = T>,
    {
        info!(run_id = %self.inner.run_id, "run started");
        let output = body(self.clone()).await;
        self.finish().await;
        info!(run_id = %self.inner.run_id, "run finished");
        output
    }

    /// Unique identifier for this run.
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// The configuration this context was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The scheduling mode for producers and agents.
    pub fn scheduling(&self) -> SchedulingMode {
        self.inner.config.scheduling
    }

    /// The runtime event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The context's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Whether this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// Number of tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Spawn a task tracked by this context.
    ///
    /// The task is dropped at its next suspension point once the context is
    /// cancelled; anything it owns (appenders, resolvers) records
    /// `Cancelled` on drop.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.inner.cancellation.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });
    }

    /// Spawn `task` now (eager) or when `starter` is triggered (on demand).
    ///
    /// A deferred start is only weakly registered here, so an unread promise
    /// is freed with its last handle. Cancelling the context discards every
    /// start still pending, which drops the task and fails its promise with
    /// `Cancelled`.
    pub(crate) fn schedule<F>(&self, starter: &Arc<DeferredStart>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.scheduling() {
            SchedulingMode::Eager => self.spawn(task),
            SchedulingMode::OnDemand if self.is_cancelled() => drop(task),
            SchedulingMode::OnDemand => {
                let run = self.clone();
                starter.set(Box::new(move || run.spawn(task)));
                let mut deferred = lock(&self.inner.deferred);
                if deferred.len() == deferred.capacity() {
                    deferred.retain(|start| start.upgrade().is_some_and(|s| s.is_pending()));
                }
                deferred.push(Arc::downgrade(starter));
            }
        }
    }

    /// Number of on-demand producers registered but not yet started.
    pub fn pending_starts(&self) -> usize {
        lock(&self.inner.deferred)
            .iter()
            .filter(|start| start.upgrade().is_some_and(|s| s.is_pending()))
            .count()
    }

    /// Cancel every outstanding task of this context.
    pub fn cancel(&self) {
        if self.inner.cancellation.is_cancelled() {
            return;
        }
        info!(run_id = %self.inner.run_id, tasks = self.inner.tracker.len(), "cancelling run");
        self.inner.cancellation.cancel();
        let deferred = std::mem::take(&mut *lock(&self.inner.deferred));
        let discarded = deferred
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|start| start.discard())
            .count();
        if discarded > 0 {
            debug!(run_id = %self.inner.run_id, discarded, "discarded unstarted producers");
        }
        self.inner.events.publish(RuntimeEvent::RunCancelled {
            run_id: self.inner.run_id,
        });
    }

    /// Wait until every task spawned so far (and any they spawn) has finished.
    ///
    /// The context stays usable afterwards.
    pub async fn finish(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
        debug!(run_id = %self.inner.run_id, "run drained");
    }

    /// Cancel, then wait for every task to wind down.
    pub async fn shutdown(&self) {
        self.cancel();
        self.finish().await;
    }

    /// Report a failure to the error handler, if one is registered.
    pub fn report_error(&self, report: &ErrorReport<'_>) {
        if let Some(handler) = &self.inner.error_handler {
            handler(report);
        }
    }

    /// Whether resolved messages should be handed to persisters.
    fn persistence_enabled(&self) -> bool {
        self.inner.config.persist_messages && !self.inner.persisters.is_empty()
    }

    /// Persist `promise`'s message once it resolves.
    ///
    /// Waiting for the message counts as demand for an on-demand promise.
    pub(crate) fn track_message(&self, promise: &MessagePromise) {
        if !self.persistence_enabled() {
            return;
        }
        let run = self.clone();
        let promise = promise.clone();
        self.spawn(async move {
            if let Ok(message) = promise.message().await {
                run.persist(&message).await;
            }
        });
    }

    /// Hand a message to every persister, once per `hash_key` per context.
    pub async fn persist(&self, message: &Message) {
        if !self.persistence_enabled() {
            return;
        }
        if !self.inner.persisted.insert(message.hash_key().to_string()) {
            return;
        }
        for persister in &self.inner.persisters {
            if let Err(error) = persister.persist_boxed(self, message).await {
                warn!(hash_key = %message.hash_key(), error = %error, "persister failed");
                self.report_error(&ErrorReport::Persist {
                    message,
                    error: &error,
                });
            }
        }
        debug!(hash_key = %message.hash_key(), "message persisted");
        self.inner.events.publish(RuntimeEvent::MessagePersisted {
            hash_key: message.hash_key().to_string(),
        });
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.inner.run_id)
            .field("scheduling", &self.inner.config.scheduling)
            .field("active_tasks", &self.inner.tracker.len())
            .field("persisters", &self.inner.persisters.len())
            .field("cancelled", &self.inner.cancellation.is_cancelled())
            .finish()
    }
}

/// Builder for a `RunContext` with persisters and an error handler.
#[derive(Default)]
pub struct RunContextBuilder {
    config: RuntimeConfig,
    persisters: Vec<Arc<dyn MessagePersisterDyn>>,
    error_handler: Option<ErrorHandler>,
}

impl RunContextBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the scheduling mode.
    pub fn scheduling(mut self, mode: SchedulingMode) -> Self {
        self.config.scheduling = mode;
        self
    }

    /// Turn agent failures into trailing error messages.
    pub fn errors_as_messages(mut self, enabled: bool) -> Self {
        self.config.errors_as_messages = enabled;
        self
    }

    /// Register a persistence hook.
    pub fn persister<P: MessagePersister + 'static>(mut self, persister: P) -> Self {
        self.persisters.push(Arc::new(persister));
        self
    }

    /// Register the error-handling callback.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ErrorReport<'_>) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Build the context.
    pub fn build(self) -> RunContext {
        let run_id = Uuid::now_v7();
        debug!(%run_id, scheduling = ?self.config.scheduling, "run context created");
        RunContext {
            inner: Arc::new(RunInner {
                run_id,
                events: EventBus::new(self.config.event_capacity),
                config: self.config,
                cancellation: CancellationToken::new(),
                tracker: TaskTracker::new(),
                persisters: self.persisters,
                persisted: DashSet::new(),
                error_handler: self.error_handler,
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }
}
