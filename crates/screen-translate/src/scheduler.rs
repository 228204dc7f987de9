use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable, BoxFuture};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Produces one processing cycle. Invoked with the cycle guard already held.
pub type CycleTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Guard that admits one recognize-translate-render cycle at a time.
pub type CycleGuard = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTiming {
    /// Quiet period after the last signal.
    pub debounce: Duration,
    /// Minimum gap between the end of one cycle and the start of the next.
    pub min_interval: Duration,
}

#[derive(Default)]
struct Pending {
    handle: Option<AbortHandle>,
    ticket: u64,
    last_completed: Option<Instant>,
}

struct Inner {
    task: CycleTask,
    guard: CycleGuard,
    cancel: CancellationToken,
    pending: Mutex<Pending>,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(self: Arc<Self>, ticket: u64, timing: DebounceTiming) {
        tokio::time::sleep(timing.debounce).await;

        let last_completed = self.pending().last_completed;
        if let Some(last) = last_completed {
            let since = last.elapsed();
            if since < timing.min_interval {
                tokio::time::sleep(timing.min_interval - since).await;
            }
        }
        if self.cancel.is_cancelled() {
            return;
        }

        let Ok(permit) = Arc::clone(&self.guard).try_lock_owned() else {
            debug!("cycle already in flight; dropping trigger");
            self.clear(ticket);
            return;
        };
        // From here on the cycle runs detached so later signals cannot abort it.
        self.clear(ticket);
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let cycle = (inner.task)();
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    debug!("cycle cancelled");
                }
                _ = cycle => {}
            }
            inner.pending().last_completed = Some(Instant::now());
            drop(permit);
        });
    }

    fn clear(&self, ticket: u64) {
        let mut pending = self.pending();
        if pending.ticket == ticket {
            pending.handle = None;
        }
    }
}

/// Trailing-edge debounce with a minimum interval and single-flight cycles.
///
/// Each [`signal`](Self::signal) replaces any trigger still waiting. When the
/// surviving trigger fires it waits out the rest of `min_interval` measured
/// from the end of the previous cycle, then runs the task only if no other
/// cycle holds the guard. A busy guard drops the trigger instead of queueing it.
#[derive(Clone)]
pub struct DebounceScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("pending", &self.is_pending())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl DebounceScheduler {
    pub fn new(task: CycleTask, guard: CycleGuard, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                task,
                guard,
                cancel,
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.inner.guard
    }

    pub fn signal(&self, timing: DebounceTiming) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let mut pending = self.inner.pending();
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
        pending.ticket = pending.ticket.wrapping_add(1);
        let ticket = pending.ticket;
        let (handle, registration) = AbortHandle::new_pair();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(Abortable::new(inner.fire(ticket, timing), registration));
        pending.handle = Some(handle);
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending().handle.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.guard.try_lock().is_err()
    }

    /// When the last scheduled cycle finished, if any.
    pub fn last_completed(&self) -> Option<Instant> {
        self.inner.pending().last_completed
    }

    pub fn cancel_pending(&self) {
        if let Some(handle) = self.inner.pending().handle.take() {
            handle.abort();
        }
    }

    /// Forgets the previous cycle so the next trigger is bounded by the
    /// debounce delay alone.
    pub fn reset(&self) {
        let mut pending = self.inner.pending();
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
        pending.last_completed = None;
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.cancel_pending();
    }
}
