//! Rate-limited snapshot emission.
//!
//! [`RenderScheduler`] decouples how often the store changes from how often
//! the consumer sees a snapshot. Notifications arriving inside the minimum
//! interval are coalesced into one pending timer; when it fires, the
//! snapshot is built from the store at that moment, so a coalesced burst
//! always yields the latest state.

use crate::{AggregateStore, HopStatsError, HopStatsResult, SchedulerConfig, Snapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Produces the current snapshot on demand.
pub trait SnapshotSource: Send + Sync + 'static {
    fn build_snapshot(&self) -> Snapshot;
}

/// Receives emitted snapshots.
///
/// `deliver` runs while the scheduler's state lock is held, which keeps
/// deliveries in emission order. Implementations must hand the snapshot off
/// (a channel, a buffer) and must not call back into the scheduler or the
/// session that owns it, or the calling thread deadlocks.
pub trait SnapshotSink: Send + Sync + 'static {
    fn deliver(&self, snapshot: Snapshot);
}

impl SnapshotSource for Mutex<AggregateStore> {
    fn build_snapshot(&self) -> Snapshot {
        // Copy-on-read: the snapshot owns its rows once the lock is released.
        lock(self).snapshot()
    }
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn build_snapshot(&self) -> Snapshot {
        (**self).build_snapshot()
    }
}

impl SnapshotSink for UnboundedSender<Snapshot> {
    fn deliver(&self, snapshot: Snapshot) {
        if self.send(snapshot).is_err() {
            debug!("Snapshot receiver dropped, discarding snapshot");
        }
    }
}

impl<T: SnapshotSink + ?Sized> SnapshotSink for Arc<T> {
    fn deliver(&self, snapshot: Snapshot) {
        (**self).deliver(snapshot)
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_emit: Option<Instant>,
    pending: Option<JoinHandle<()>>,
    /// Bumped whenever a pending timer is armed or discarded; a timer only
    /// fires if its generation is still current.
    generation: u64,
    closed: bool,
    emissions: u64,
}

struct Inner<S, K> {
    min_interval: Duration,
    source: S,
    sink: K,
    runtime: Handle,
    state: Mutex<SchedulerState>,
}

impl<S: SnapshotSource, K: SnapshotSink> Inner<S, K> {
    fn remaining(&self, state: &SchedulerState, now: Instant) -> Option<Duration> {
        let last = state.last_emit?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }

    fn emit_locked(&self, state: &mut SchedulerState) {
        state.last_emit = Some(Instant::now());
        state.emissions += 1;
        let snapshot = self.source.build_snapshot();
        debug!(
            session_id = %snapshot.session_id,
            iteration = snapshot.iteration,
            rows = snapshot.stats.len(),
            emission = state.emissions,
            "Emitting snapshot"
        );
        self.sink.deliver(snapshot);
    }

    fn discard_pending_locked(&self, state: &mut SchedulerState) {
        state.generation += 1;
        if let Some(handle) = state.pending.take() {
            trace!("Cancelling pending emission");
            handle.abort();
        }
    }

    fn fire(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.closed || state.generation != generation || state.pending.is_none() {
            trace!(generation, "Stale emission timer, ignoring");
            return;
        }
        state.pending = None;
        self.emit_locked(&mut state);
    }
}

/// Single-owner scheduler turning change notifications into snapshot emissions.
pub struct RenderScheduler<S, K> {
    inner: Arc<Inner<S, K>>,
}

impl<S: SnapshotSource, K: SnapshotSink> RenderScheduler<S, K> {
    /// Creates a scheduler bound to the current tokio runtime.
    pub fn new(config: SchedulerConfig, source: S, sink: K) -> HopStatsResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| HopStatsError::RuntimeUnavailable)?;
        Ok(Self {
            inner: Arc::new(Inner {
                min_interval: config.min_interval(),
                source,
                sink,
                runtime,
                state: Mutex::new(SchedulerState::default()),
            }),
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Requests an emission.
    ///
    /// Emits immediately if the minimum interval has passed since the last
    /// emission, otherwise arms one timer for the remainder. Further calls
    /// before that timer fires are absorbed by it.
    pub fn notify(&self) {
        let mut state = lock(&self.inner.state);
        if state.closed || state.pending.is_some() {
            return;
        }
        match self.inner.remaining(&state, Instant::now()) {
            None => self.inner.emit_locked(&mut state),
            Some(wait) => self.arm_locked(&mut state, wait),
        }
    }

    /// Cancels any pending timer and emits.
    ///
    /// With `force` the emission is immediate; without it the minimum
    /// interval is still honored.
    pub fn flush(&self, force: bool) {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return;
        }
        self.inner.discard_pending_locked(&mut state);
        if !force {
            if let Some(wait) = self.inner.remaining(&state, Instant::now()) {
                self.arm_locked(&mut state, wait);
                return;
            }
        }
        self.inner.emit_locked(&mut state);
    }

    /// Discards a pending emission without firing it.
    pub fn cancel(&self) {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return;
        }
        self.inner.discard_pending_locked(&mut state);
    }

    /// Cancels any pending emission and stops accepting requests.
    pub fn close(&self) {
        self.close_with(|| ());
    }

    /// Closes the scheduler, running `f` while its state is still locked.
    pub fn close_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut state = lock(&self.inner.state);
        self.inner.discard_pending_locked(&mut state);
        state.closed = true;
        f()
    }

    /// Runs `f` with the state locked if the scheduler is still open.
    ///
    /// Returns `None` without running `f` once closed. A concurrent
    /// [`close_with`](Self::close_with) or [`flush_and_close`](Self::flush_and_close)
    /// either happens entirely before or entirely after `f`.
    pub fn if_open<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = lock(&self.inner.state);
        if state.closed {
            return None;
        }
        Some(f())
    }

    /// Emits the current state and closes, in one lock hold.
    ///
    /// Returns false if the scheduler was already closed.
    pub fn flush_and_close(&self) -> bool {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return false;
        }
        self.inner.discard_pending_locked(&mut state);
        self.inner.emit_locked(&mut state);
        state.closed = true;
        true
    }

    /// Discards pending work, reopens the scheduler and runs `f` while its
    /// state is still locked, so no emission can interleave with `f`.
    pub fn reset_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut state = lock(&self.inner.state);
        self.inner.discard_pending_locked(&mut state);
        state.closed = false;
        state.last_emit = None;
        f()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.state).closed
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.state).pending.is_some()
    }

    /// Number of snapshots emitted so far.
    pub fn emissions(&self) -> u64 {
        lock(&self.inner.state).emissions
    }

    fn arm_locked(&self, state: &mut SchedulerState, wait: Duration) {
        state.generation += 1;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        trace!(wait_ms = wait.as_millis() as u64, generation, "Arming emission timer");
        state.pending = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            inner.fire(generation);
        }));
    }
}

impl<S, K> Drop for RenderScheduler<S, K> {
    fn drop(&mut self) {
        let mut state = lock(&self.inner.state);
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
    }
}
