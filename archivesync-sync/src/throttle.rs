use archivesync_types::ConversationKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Remembers when each conversation last received a forward page.
#[derive(Clone)]
pub struct SyncThrottle {
    debounce: Duration,
    last_synced: Arc<Mutex<HashMap<ConversationKey, Instant>>>,
}

impl SyncThrottle {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_synced: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records a forward page for `key` and forgets conversations whose
    /// debounce interval has run out.
    pub fn mark_synced(&self, key: &ConversationKey) {
        let mut last = self.last_synced.lock().unwrap_or_else(PoisonError::into_inner);
        last.retain(|_, at| at.elapsed() < self.debounce);
        last.insert(key.clone(), Instant::now());
    }

    /// Number of conversations currently inside their debounce interval
    /// or not yet pruned.
    pub fn tracked(&self) -> usize {
        self.last_synced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if `key` was synchronized less than the debounce interval ago.
    pub fn synced_recently(&self, key: &ConversationKey) -> bool {
        let last = self.last_synced.lock().unwrap_or_else(PoisonError::into_inner);
        last.get(key)
            .is_some_and(|at| at.elapsed() < self.debounce)
    }
}
