//! Caller cancellation and deadlines.
//!
//! Every engine operation takes an [`OperationContext`]. Operations check it
//! before each remote call and the offboard poller races its sleeps against
//! it, so a cancelled caller never waits on a further round-trip.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ReconcileError, Result};

/// Cancellation signal and optional deadline for one engine operation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel_rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the contexts created alongside it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl OperationContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that can be cancelled through the returned handle.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel_rx: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Returns a copy that expires `timeout` from now, or earlier if this
    /// context already has a closer deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        // A timeout past the end of representable time is no deadline at all
        Instant::now()
            .checked_add(timeout)
            .map_or_else(|| self.clone(), |deadline| self.with_deadline(deadline))
    }

    /// Returns a copy with the earlier of the existing and given deadlines.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = self.deadline.map_or(deadline, |d| d.min(deadline));
        Self {
            cancel_rx: self.cancel_rx.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns true once the handle has signalled cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the operation must stop before its next remote call.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Cancelled`] if the context is cancelled, or
    /// [`ReconcileError::DeadlineExceeded`] if it is past its deadline.
    pub fn check(&self, kind: impl std::fmt::Display, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled {
                kind: kind.to_string(),
                operation: operation.to_string(),
            }
            .into());
        }
        if self.is_expired() {
            return Err(ReconcileError::DeadlineExceeded {
                kind: kind.to_string(),
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Completes when cancellation is signalled. Never completes for a
    /// context without a handle, or once the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel_rx else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}
