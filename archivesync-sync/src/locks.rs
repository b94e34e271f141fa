//! Per-conversation mutual exclusion.

use archivesync_types::ConversationKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type TokioMutex<T> = tokio::sync::Mutex<T>;

/// One async lock per conversation key.
///
/// A controller holds the guard from its first cursor read until its last
/// page commit, so forward and backward syncs of the same conversation never
/// interleave.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    locks: Arc<Mutex<HashMap<ConversationKey, Arc<TokioMutex<()>>>>>,
}

/// Held while a conversation is being synchronized. Dropping it releases the lock.
pub struct ConversationGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task synchronizes `key`.
    pub async fn acquire(&self, key: &ConversationKey) -> ConversationGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Forget idle locks of other conversations.
            locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        ConversationGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// True while some task holds the lock for `key`.
    pub fn is_held(&self, key: &ConversationKey) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }
}
