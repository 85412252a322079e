//! Per-key mutual exclusion for policy read-modify-write cycles.
//!
//! Several resource instances in one provider process may target the same
//! policy. Each cycle holds the lock for its resource name from the read to
//! the write; the guard releases it on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Table of async mutexes keyed by string.
///
/// Entries are never removed. The table holds one small entry per resource
/// name the process has locked, which is bounded by the resources it manages.
#[derive(Debug, Default)]
pub struct MutexTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one key. Released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The locked key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        trace!("Released lock {}", self.key);
    }
}

impl MutexTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<MutexTable> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        trace!("Acquiring lock {key}");
        let guard = mutex.lock_owned().await;
        trace!("Acquired lock {key}");

        KeyGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys ever locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no key was ever locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
