//! Offboard-Wait Poller.
//!
//! After a soft delete the remote object stays visible with `deleted = true`
//! until teardown finishes. The poller reads it on a capped exponential
//! backoff until it is gone, the deadline passes, or the caller cancels.
//!
//! ```text
//! PENDING_DELETE --NotFound--> DELETED
//!       |  \--deadline-------> TIMEOUT
//!       \--deleted=false-----> error (Unexpected)
//! ```

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::context::OperationContext;
use crate::error::{OffboardError, ReconcileError, Result};
use crate::remote::ResourceApi;
use crate::state::ResourceInstance;

/// Default first wait between polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default cap on the wait between polls.
pub const DEFAULT_MAX_POLL_INTERVAL_SECS: u64 = 30;

/// Default overall offboarding timeout.
pub const DEFAULT_OFFBOARD_TIMEOUT_SECS: u64 = 600;

/// Shortest wait between polls. Shorter configured intervals are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of time for the poller.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspends for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns at once and advances time.
#[derive(Debug)]
pub struct FakeClock {
    start: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClock {
    /// Creates a clock at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Virtual time elapsed so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
            *offset = offset.saturating_add(duration);
        }
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        tokio::task::yield_now().await;
    }
}

/// Polling cadence and overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// First wait between polls.
    pub initial_interval: Duration,
    /// Cap on the wait between polls.
    pub max_interval: Duration,
    /// Overall time allowed for offboarding.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_interval: Duration::from_secs(DEFAULT_MAX_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_OFFBOARD_TIMEOUT_SECS),
        }
    }
}

/// Doubling backoff capped at a maximum.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    initial: Duration,
    current: Duration,
    max: Duration,
}

impl PollBackoff {
    /// Creates a backoff from the given settings.
    #[must_use]
    pub fn new(settings: &PollSettings) -> Self {
        let initial = settings.initial_interval.max(MIN_POLL_INTERVAL);
        Self {
            initial,
            current: initial,
            max: settings.max_interval.max(initial),
        }
    }

    /// Returns the next interval and advances the sequence.
    pub fn next_interval(&mut self) -> Duration {
        let interval = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        interval
    }

    /// Restarts the sequence at the initial interval.
    pub const fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Outcome of a completed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Reads issued, including the final one that saw the object gone.
    pub polls: u32,
    /// Time spent waiting.
    pub waited: Duration,
}

/// Drives a soft-deleted object to hard deletion.
pub struct OffboardPoller<'a, A: ResourceApi + ?Sized, C: Clock + ?Sized> {
    api: &'a A,
    clock: &'a C,
    settings: PollSettings,
}

impl<'a, A: ResourceApi + ?Sized, C: Clock + ?Sized> OffboardPoller<'a, A, C> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(api: &'a A, clock: &'a C, settings: PollSettings) -> Self {
        Self {
            api,
            clock,
            settings,
        }
    }

    /// Waits until `instance` is gone.
    ///
    /// The effective deadline is the earlier of the configured timeout and
    /// the context's deadline. The last sleep is cut short to land on the
    /// deadline, and one final poll is made there before giving up.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The deadline passes while the object is still marked deleted
    /// - The context is cancelled
    /// - The object reappears as not deleted
    /// - A read fails for any reason other than not-found
    pub async fn wait(
        &self,
        ctx: &OperationContext,
        instance: &ResourceInstance,
    ) -> Result<PollReport> {
        let kind = instance.kind();
        let scope = instance.project_scope();
        let external_id = instance.external_id();

        let budget = ctx
            .remaining()
            .map_or(self.settings.timeout, |r| r.min(self.settings.timeout));
        let started = self.clock.now();
        let mut backoff = PollBackoff::new(&self.settings);
        let mut polls: u32 = 0;

        info!("Waiting for {kind} {external_id} to finish offboarding (budget {budget:?})");

        loop {
            if ctx.is_cancelled() {
                return Err(cancelled(instance, polls));
            }

            polls += 1;
            let result = self.api.get_by_id(kind, scope, external_id).await;
            let waited = self.clock.now().saturating_duration_since(started);

            match result {
                Err(e) if e.is_not_found() => {
                    info!("{kind} {external_id} offboarded after {polls} polls ({waited:?})");
                    return Ok(PollReport { polls, waited });
                }
                Err(e) => return Err(e.in_operation("poll offboarding of", kind, external_id)),
                Ok(remote) if !remote.deleted => {
                    return Err(ReconcileError::Unexpected {
                        kind: kind.to_string(),
                        external_id: external_id.to_string(),
                        message: String::from(
                            "no longer marked for deletion while waiting for offboarding",
                        ),
                    }
                    .into());
                }
                Ok(_) => {}
            }

            let left = budget.saturating_sub(waited);
            if left.is_zero() {
                return Err(OffboardError::Timeout {
                    kind: kind.to_string(),
                    external_id: external_id.to_string(),
                    polls,
                    waited_secs: waited.as_secs(),
                }
                .into());
            }

            let interval = backoff.next_interval().min(left);
            debug!("{kind} {external_id} still offboarding, poll {polls}, next in {interval:?}");

            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(cancelled(instance, polls)),
                () = self.clock.sleep(interval) => {}
            }
        }
    }
}

fn cancelled(instance: &ResourceInstance, polls: u32) -> crate::error::RadarError {
    OffboardError::Cancelled {
        kind: instance.kind().to_string(),
        external_id: instance.external_id().to_string(),
        polls,
    }
    .into()
}
