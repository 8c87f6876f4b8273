//! Rate-limiting request scheduler
//!
//! Requests are queued FIFO and released to a [`RequestExecutor`] at a
//! bounded concurrency. Consecutive dispatches are spaced by an interval
//! that follows time of day; freed capacity is reused without waiting.
//!
//! The scheduler is an owned handle: construct it once, call
//! [`RequestScheduler::start`], clone it into every caller and call
//! [`RequestScheduler::shutdown`] on the way out.

pub mod interval;
pub mod queue;
pub mod types;

pub use interval::{IntervalSettings, IntervalState, IntervalUpdate, TimeOfDayPolicy};
pub use types::*;

use crate::infrastructure::log_messages::scheduler as log_msg;
use chrono::Utc;
use parking_lot::Mutex;
use queue::{queued_request_id, QueuedRequest, RequestQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Wall-clock cadence of the time-of-day recomputation
pub const DEFAULT_RECOMPUTE_EVERY: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub intervals: IntervalSettings,
    pub policy: TimeOfDayPolicy,
    pub recompute_every: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            intervals: IntervalSettings::default(),
            policy: TimeOfDayPolicy::default(),
            recompute_every: DEFAULT_RECOMPUTE_EVERY,
        }
    }
}

struct State {
    queue: RequestQueue,
    executing: usize,
    concurrency: usize,
    interval: IntervalState,
    started: bool,
    shut_down: bool,
}

struct Shared {
    state: Mutex<State>,
    executor: Arc<dyn RequestExecutor>,
    /// Signalled on submission
    work: Notify,
    /// Signalled when a slot frees up or the ceiling changes
    capacity: Notify,
    shutdown: CancellationToken,
    recompute_every: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

enum Dispatch {
    Started { more: bool },
    Skipped,
    Idle,
    Shutdown,
}

/// Returns the slot when an execution ends, however it ends
struct ExecutionSlot {
    shared: Arc<Shared>,
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.executing = state.executing.saturating_sub(1);
        }
        self.shared.capacity.notify_one();
    }
}

#[derive(Clone)]
pub struct RequestScheduler {
    shared: Arc<Shared>,
}

impl RequestScheduler {
    pub fn new(executor: Arc<dyn RequestExecutor>, config: SchedulerConfig) -> Self {
        let interval = IntervalState::new(config.intervals, config.policy, Utc::now());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: RequestQueue::new(),
                    executing: 0,
                    concurrency: config.concurrency.max(1),
                    interval,
                    started: false,
                    shut_down: false,
                }),
                executor,
                work: Notify::new(),
                capacity: Notify::new(),
                shutdown: CancellationToken::new(),
                recompute_every: config.recompute_every,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the dispatch loop and the interval clock
    ///
    /// Calling it again has no effect.
    pub fn start(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.started || state.shut_down {
                return;
            }
            state.started = true;
        }

        let dispatcher = tokio::spawn(run_dispatcher(Arc::clone(&self.shared)));
        let clock = tokio::spawn(run_interval_clock(Arc::clone(&self.shared)));
        self.shared.tasks.lock().extend([dispatcher, clock]);
        info!("{}", log_msg::STARTED);
    }

    /// Queue a request
    ///
    /// A still-queued request with the same cancellation key is removed and
    /// fails with [`SchedulerError::Superseded`].
    pub fn submit(&self, options: RequestOptions, delivery: Delivery) -> Submission {
        let id = queued_request_id();
        let (responder, rx) = oneshot::channel();
        let key = options.cancellation_key.clone();
        let entry = QueuedRequest {
            id: id.clone(),
            options,
            delivery,
            queued_at: Utc::now(),
            responder,
        };

        let mut state = self.shared.state.lock();
        if state.shut_down {
            drop(state);
            entry.reject(SchedulerError::Destroyed);
            return Submission::new(id, rx);
        }

        let superseded = key.and_then(|key| state.queue.remove_by_key(&key));
        state.queue.push(entry);
        let queue_size = state.queue.len();
        drop(state);

        if let Some(old) = superseded {
            info!(superseded = %old.id, replacement = %id, "{}", log_msg::REQUEST_SUPERSEDED);
            let old_id = old.id.clone();
            old.reject(SchedulerError::Superseded { id: old_id });
        }

        debug!(id = %id, queue_size, "{}", log_msg::REQUEST_QUEUED);
        self.shared.work.notify_one();
        Submission::new(id, rx)
    }

    /// Scale the current interval for end-user activity
    pub fn set_activity_level(&self, active: bool) {
        let mut state = self.shared.state.lock();
        state.interval.scale_for_activity(active);
        debug!(active, interval_ms = state.interval.current_ms(), "Activity level applied");
    }

    /// Change the ceiling; at least one request may always execute
    pub fn set_concurrency(&self, limit: usize) {
        let limit = limit.max(1);
        {
            let mut state = self.shared.state.lock();
            if state.concurrency == limit {
                return;
            }
            state.concurrency = limit;
        }
        info!(limit, "{}", log_msg::CONCURRENCY_CHANGED);
        self.shared.capacity.notify_one();
    }

    pub fn update_interval_settings(&self, update: IntervalUpdate) {
        let mut state = self.shared.state.lock();
        state.interval.update(update, Utc::now());
        info!(
            interval_ms = state.interval.current_ms(),
            "{}", log_msg::INTERVAL_RECOMPUTED
        );
    }

    /// Re-run the time-of-day policy now
    pub fn recompute_interval(&self) {
        self.shared.recompute_interval();
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        QueueStatus {
            queue_size: state.queue.len(),
            executing: state.executing,
            concurrency_limit: state.concurrency,
            current_interval_ms: state.interval.current_ms(),
            interval_settings: state.interval.settings(),
            queued_requests: state.queue.summaries(),
        }
    }

    /// Reject everything still queued and stop the background tasks
    ///
    /// Executions already in flight run to completion.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            state.shut_down = true;
            state.queue.drain()
        };
        info!(rejected = drained.len(), "{}", log_msg::SHUTTING_DOWN);
        for entry in drained {
            entry.reject(SchedulerError::Destroyed);
        }

        self.shared.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Shared {
    fn recompute_interval(&self) {
        let mut state = self.state.lock();
        state.interval.recompute(Utc::now());
        debug!(
            interval_ms = state.interval.current_ms(),
            "{}", log_msg::INTERVAL_RECOMPUTED
        );
    }

    fn current_interval(&self) -> Duration {
        self.state.lock().interval.current()
    }

    fn dispatch_next(self: &Arc<Self>) -> Dispatch {
        let mut state = self.state.lock();
        if state.shut_down {
            return Dispatch::Shutdown;
        }
        if state.executing >= state.concurrency {
            return Dispatch::Idle;
        }
        let Some(entry) = state.queue.pop_front() else {
            return Dispatch::Idle;
        };

        if entry.options.cancel.is_cancelled() {
            drop(state);
            debug!(id = %entry.id, "{}", log_msg::REQUEST_ABORTED_BEFORE_START);
            entry.reject(SchedulerError::Aborted);
            return Dispatch::Skipped;
        }

        state.executing += 1;
        let more = state.executing < state.concurrency && !state.queue.is_empty();
        let executing = state.executing;
        drop(state);

        debug!(
            id = %entry.id,
            request_id = %entry.options.request_id,
            kind = %entry.delivery.kind(),
            executing,
            "{}", log_msg::REQUEST_DISPATCHED
        );

        let slot = ExecutionSlot {
            shared: Arc::clone(self),
        };
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let QueuedRequest {
                options,
                delivery,
                responder,
                ..
            } = entry;
            let outcome = executor.execute(options, delivery).await;
            drop(slot);
            let _ = responder.send(outcome);
        });

        Dispatch::Started { more }
    }
}

async fn run_dispatcher(shared: Arc<Shared>) {
    loop {
        match shared.dispatch_next() {
            Dispatch::Shutdown => return,
            Dispatch::Skipped | Dispatch::Started { more: false } => {}
            Dispatch::Started { more: true } => {
                // Spread bursts out; only the timer or shutdown ends the wait
                let spacing = shared.current_interval();
                tokio::select! {
                    () = shared.shutdown.cancelled() => return,
                    () = tokio::time::sleep(spacing) => {}
                }
            }
            Dispatch::Idle => {
                tokio::select! {
                    () = shared.shutdown.cancelled() => return,
                    () = shared.work.notified() => {}
                    () = shared.capacity.notified() => {}
                }
            }
        }
    }
}

async fn run_interval_clock(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.recompute_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the interval was computed at construction
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shared.shutdown.cancelled() => return,
            _ = ticker.tick() => shared.recompute_interval(),
        }
    }
}
