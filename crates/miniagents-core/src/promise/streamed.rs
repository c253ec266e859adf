//! Replayable streamed promise.
//!
//! A `StreamedPromise<P, W>` owns an append-only buffer of pieces and a
//! terminal outcome. The single writer (a `StreamAppender`) appends pieces;
//! every reader gets its own `PieceIter` cursor starting at index zero, so
//! late readers replay what is cached before catching up with live pieces.
//! The whole value is reduced from the complete piece list once and shared.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt};
use tokio::sync::{Notify, OnceCell};

use miniagents_types::error::PromiseError;

use super::{DeferredStart, lock, panic_message};
use crate::run::RunContext;

/// Reduces a complete piece list into the whole value.
pub type Reducer<P, W> = Arc<dyn Fn(&[P]) -> Result<W, PromiseError> + Send + Sync>;

struct BufferState<P> {
    pieces: Vec<P>,
    outcome: Option<Result<(), PromiseError>>,
}

/// Piece buffer shared by the writer and all readers.
struct PieceBuffer<P> {
    state: Mutex<BufferState<P>>,
    notify: Notify,
}

impl<P> PieceBuffer<P> {
    fn new(pieces: Vec<P>, outcome: Option<Result<(), PromiseError>>) -> Self {
        Self {
            state: Mutex::new(BufferState { pieces, outcome }),
            notify: Notify::new(),
        }
    }

    fn push(&self, piece: P) -> Result<(), PromiseError> {
        {
            let mut state = lock(&self.state);
            if state.outcome.is_some() {
                return Err(PromiseError::AlreadyFinished);
            }
            state.pieces.push(piece);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn finish(&self, outcome: Result<(), PromiseError>) -> bool {
        {
            let mut state = lock(&self.state);
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
        }
        self.notify.notify_waiters();
        true
    }
}

struct WholeSlot<P, W> {
    reducer: Reducer<P, W>,
    cell: OnceCell<Result<W, PromiseError>>,
}

/// A promise whose value arrives as an ordered sequence of pieces.
///
/// Cloning shares the same buffer and whole.
pub struct StreamedPromise<P, W> {
    buffer: Arc<PieceBuffer<P>>,
    whole: Arc<WholeSlot<P, W>>,
    starter: Arc<DeferredStart>,
}

impl<P, W> Clone for StreamedPromise<P, W> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            whole: Arc::clone(&self.whole),
            starter: Arc::clone(&self.starter),
        }
    }
}

impl<P, W> StreamedPromise<P, W>
where
    P: Clone + Send + Sync + 'static,
    W: Clone + Send + Sync + 'static,
{
    fn from_buffer<R>(buffer: PieceBuffer<P>, reducer: R) -> Self
    where
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        Self {
            buffer: Arc::new(buffer),
            whole: Arc::new(WholeSlot {
                reducer: Arc::new(reducer),
                cell: OnceCell::new(),
            }),
            starter: Arc::default(),
        }
    }

    /// A promise whose pieces are produced by `producer`, run as a task of `run`.
    ///
    /// The producer is invoked at most once (immediately under eager
    /// scheduling, on first demand otherwise) with the appender it writes
    /// into. Its `Ok` completes the stream; its `Err`, a panic, or cancellation
    /// of `run` becomes the terminal failure after the pieces already appended.
    pub fn new<F, Fut, R>(run: &RunContext, producer: F, reducer: R) -> Self
    where
        F: FnOnce(StreamAppender<P>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PromiseError>> + Send + 'static,
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        let promise = Self::from_buffer(PieceBuffer::new(Vec::new(), None), reducer);
        let finisher = StreamAppender::finishing(Arc::clone(&promise.buffer));
        let handle = finisher.handle();

        let task = async move {
            let outcome = match AssertUnwindSafe(producer(handle)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(PromiseError::Producer(panic_message(payload))),
            };
            finisher.finish(outcome);
        };
        run.schedule(&promise.starter, task);
        promise
    }

    /// A promise that drives `stream` to completion, one piece per item.
    pub fn from_stream<S, R>(run: &RunContext, stream: S, reducer: R) -> Self
    where
        S: Stream<Item = Result<P, PromiseError>> + Send + 'static,
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        Self::new(
            run,
            move |appender| async move {
                let mut stream = std::pin::pin!(stream);
                while let Some(piece) = stream.next().await {
                    appender.append(piece?)?;
                }
                Ok(())
            },
            reducer,
        )
    }

    /// An already-complete promise.
    pub fn ready<R>(pieces: Vec<P>, reducer: R) -> Self
    where
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        Self::from_buffer(PieceBuffer::new(pieces, Some(Ok(()))), reducer)
    }

    /// An already-failed promise with no pieces.
    pub fn failed<R>(error: PromiseError, reducer: R) -> Self
    where
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        Self::from_buffer(PieceBuffer::new(Vec::new(), Some(Err(error))), reducer)
    }

    /// A pending promise and the appender that feeds it.
    ///
    /// Dropping the appender before `complete` or `fail` records
    /// `PromiseError::Cancelled`.
    pub fn appender<R>(reducer: R) -> (StreamAppender<P>, Self)
    where
        R: Fn(&[P]) -> Result<W, PromiseError> + Send + Sync + 'static,
    {
        let promise = Self::from_buffer(PieceBuffer::new(Vec::new(), None), reducer);
        (StreamAppender::finishing(Arc::clone(&promise.buffer)), promise)
    }

    /// A fresh cursor over all pieces, starting from the first one.
    pub fn iter(&self) -> PieceIter<P> {
        PieceIter {
            buffer: Arc::clone(&self.buffer),
            starter: Arc::clone(&self.starter),
            cursor: 0,
            done: false,
        }
    }

    /// The pieces as a `Stream`, ending with the failure if there is one.
    pub fn stream(&self) -> BoxStream<'static, Result<P, PromiseError>> {
        self.iter().into_stream().boxed()
    }

    /// Wait for the stream to finish and return every piece.
    pub async fn pieces(&self) -> Result<Vec<P>, PromiseError> {
        let mut iter = self.iter();
        let mut pieces = Vec::new();
        while let Some(piece) = iter.next().await {
            pieces.push(piece?);
        }
        Ok(pieces)
    }

    /// The reduced whole. Computed once and shared by every caller.
    pub async fn whole(&self) -> Result<W, PromiseError> {
        self.whole
            .cell
            .get_or_init(|| async {
                let pieces = self.pieces().await?;
                (self.whole.reducer)(&pieces)
            })
            .await
            .clone()
    }

    /// Pieces cached so far. Does not start an on-demand producer.
    pub fn cached_len(&self) -> usize {
        lock(&self.buffer.state).pieces.len()
    }

    /// The terminal outcome, if reached. Does not start an on-demand producer.
    pub fn outcome(&self) -> Option<Result<(), PromiseError>> {
        lock(&self.buffer.state).outcome.clone()
    }

    /// Whether both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl<P, W> fmt::Debug for StreamedPromise<P, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.buffer.state);
        let status = match &state.outcome {
            None => "running",
            Some(Ok(())) => "completed",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("StreamedPromise")
            .field("pieces", &state.pieces.len())
            .field("status", &status)
            .finish()
    }
}

/// Independent read cursor over a `StreamedPromise`.
///
/// Dropping a cursor never affects the producer or other cursors.
pub struct PieceIter<P> {
    buffer: Arc<PieceBuffer<P>>,
    starter: Arc<DeferredStart>,
    cursor: usize,
    done: bool,
}

impl<P> PieceIter<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// The next piece, `None` after completion, or the failure as the last item.
    pub async fn next(&mut self) -> Option<Result<P, PromiseError>> {
        if self.done {
            return None;
        }
        self.starter.trigger();
        loop {
            let notified = self.buffer.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = lock(&self.buffer.state);
                if let Some(piece) = state.pieces.get(self.cursor) {
                    self.cursor += 1;
                    return Some(Ok(piece.clone()));
                }
                match &state.outcome {
                    Some(Ok(())) => {
                        self.done = true;
                        return None;
                    }
                    Some(Err(err)) => {
                        self.done = true;
                        return Some(Err(err.clone()));
                    }
                    None => {}
                }
            }
            notified.await;
        }
    }

    /// Number of pieces this cursor has yielded.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Turn the cursor into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<P, PromiseError>> + Send + 'static {
        futures_util::stream::unfold(self, |mut iter| async move {
            iter.next().await.map(|item| (item, iter))
        })
    }
}

/// Write side of a `StreamedPromise`.
///
/// The finishing appender (from `StreamedPromise::appender`) records
/// `Cancelled` if dropped before a terminal state, so a consumer never waits
/// forever on a producer that was killed. Handles passed to producer
/// functions leave finishing to the task that drives them.
pub struct StreamAppender<P> {
    buffer: Arc<PieceBuffer<P>>,
    finish_on_drop: bool,
}

impl<P> StreamAppender<P> {
    fn finishing(buffer: Arc<PieceBuffer<P>>) -> Self {
        Self {
            buffer,
            finish_on_drop: true,
        }
    }

    /// A non-finishing handle onto the same buffer.
    pub(crate) fn handle(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            finish_on_drop: false,
        }
    }

    /// Append a piece. Fails with `AlreadyFinished` after a terminal state.
    pub fn append(&self, piece: P) -> Result<(), PromiseError> {
        self.buffer.push(piece)
    }

    /// Record successful completion.
    pub fn complete(&self) -> bool {
        self.buffer.finish(Ok(()))
    }

    /// Record a terminal failure.
    pub fn fail(&self, error: PromiseError) -> bool {
        self.buffer.finish(Err(error))
    }

    /// Record the given outcome.
    pub fn finish(&self, outcome: Result<(), PromiseError>) -> bool {
        self.buffer.finish(outcome)
    }

    /// Whether a terminal state has been recorded.
    pub fn is_finished(&self) -> bool {
        lock(&self.buffer.state).outcome.is_some()
    }
}

impl<P> Drop for StreamAppender<P> {
    fn drop(&mut self) {
        if self.finish_on_drop {
            self.buffer.finish(Err(PromiseError::Cancelled));
        }
    }
}

impl<P> fmt::Debug for StreamAppender<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAppender")
            .field("finish_on_drop", &self.finish_on_drop)
            .finish()
    }
}
