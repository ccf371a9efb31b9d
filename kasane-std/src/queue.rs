//! Concurrent event queue.
//!
//! Events are handed to a handler on their own tokio task as soon as they are
//! added. Tasks start in FIFO order but may finish in any order. There is no
//! concurrency cap and no backpressure.
//!
//! All methods that start work require a running tokio runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = EventQueue::new(|update: Update| async move {
//!     store(update).await?;
//!     Ok(())
//! });
//!
//! queue.add_batch(updates);
//! queue.on_idle().await;
//! queue.stop().await;
//! ```

use futures::{FutureExt, future::BoxFuture};
use kasane_core::{Message, StepResult, panic_message};
use std::{
    collections::{HashSet, VecDeque},
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::sync::oneshot;

/// How long [`EventQueue::stop`] waits for in-flight tasks.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(3000);

type QueueHandler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, StepResult> + Send + Sync>;

/// A FIFO queue whose events are processed concurrently.
///
/// Cloning yields another handle to the same queue.
pub struct EventQueue<E: Message> {
    shared: Arc<Shared<E>>,
}

struct Shared<E> {
    handler: QueueHandler<E>,
    state: Mutex<State<E>>,
}

struct State<E> {
    active: bool,
    backlog: VecDeque<E>,
    in_flight: HashSet<u64>,
    next_id: u64,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl<E> State<E> {
    fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.in_flight.is_empty()
    }
}

impl<E: Message> EventQueue<E> {
    /// Create an active queue feeding `handler`.
    ///
    /// Handler failures and panics are logged at `debug` and discarded.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let handler: QueueHandler<E> =
            Arc::new(move |event| -> BoxFuture<'static, StepResult> { Box::pin(handler(event)) });
        Self {
            shared: Arc::new(Shared {
                handler,
                state: Mutex::new(State {
                    active: true,
                    backlog: VecDeque::new(),
                    in_flight: HashSet::new(),
                    next_id: 0,
                    idle_waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Queue one event and start processing.
    pub fn add(&self, event: E) {
        self.shared.lock().backlog.push_back(event);
        self.drain();
    }

    /// Queue several events, in order, and start processing.
    pub fn add_batch<I>(&self, events: I)
    where
        I: IntoIterator<Item = E>,
    {
        self.shared.lock().backlog.extend(events);
        self.drain();
    }

    /// Resolve once nothing is queued or in flight.
    pub async fn on_idle(&self) {
        let waiter = {
            let mut state = self.shared.lock();
            if state.is_idle() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.idle_waiters.push(tx);
            rx
        };
        let _ = waiter.await;
    }

    /// Stop accepting work and wait up to [`DEFAULT_STOP_TIMEOUT`] for
    /// in-flight tasks.
    pub async fn stop(&self) {
        self.stop_within(DEFAULT_STOP_TIMEOUT).await;
    }

    /// Stop accepting work and wait up to `limit` for in-flight tasks.
    ///
    /// Never fails; tasks still running at the deadline are left detached.
    /// Events added after the stop stay queued.
    pub async fn stop_within(&self, limit: Duration) {
        self.shared.lock().active = false;
        if tokio::time::timeout(limit, self.on_idle()).await.is_err() {
            tracing::debug!(
                in_flight = self.pending(),
                ?limit,
                "event queue stopped before tasks settled"
            );
        }
    }

    /// Number of tasks currently running.
    pub fn pending(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    /// Number of events waiting to start.
    pub fn queued(&self) -> usize {
        self.shared.lock().backlog.len()
    }

    /// Whether the queue still starts new work.
    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    fn drain(&self) {
        let started: Vec<(u64, E)> = {
            let mut state = self.shared.lock();
            let mut started = Vec::new();
            while state.active {
                let Some(event) = state.backlog.pop_front() else {
                    break;
                };
                let id = state.next_id;
                state.next_id += 1;
                state.in_flight.insert(id);
                started.push((id, event));
            }
            started
        };

        for (id, event) in started {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let handler = Arc::clone(&shared.handler);
                let outcome = AssertUnwindSafe(async move { handler(event).await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => tracing::debug!(task = id, %error, "queued task failed"),
                    Err(payload) => tracing::debug!(
                        task = id,
                        panic = %panic_message(&*payload),
                        "queued task panicked"
                    ),
                }
                shared.settle(id);
            });
        }
    }
}

impl<E> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, id: u64) {
        let waiters = {
            let mut state = self.lock();
            state.in_flight.remove(&id);
            if !state.is_idle() {
                return;
            }
            std::mem::take(&mut state.idle_waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl<E: Message> Clone for EventQueue<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Message> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("EventQueue")
            .field("active", &state.active)
            .field("queued", &state.backlog.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
