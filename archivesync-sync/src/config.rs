//! Archive sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the mapper does with an entry it cannot turn into plain text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndecodablePolicy {
    /// Discard the whole page: nothing is stored and the cursor does not move.
    #[default]
    DiscardPage,
    /// Drop only the offending entry and keep the rest of the page.
    SkipEntry,
}

/// Configuration for archive synchronization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Entries requested per archive query. Matches the local preload window.
    pub page_size: usize,

    /// Minimum time between two forward syncs of the same conversation (seconds).
    pub sync_debounce_secs: u64,

    /// Half-width of the duplicate detection time window (milliseconds).
    pub dedup_window_ms: i64,

    pub undecodable_entries: UndecodablePolicy,

    /// Capacity of the event channel created by
    /// [`SyncCoordinatorBuilder::build_with_events`](crate::SyncCoordinatorBuilder::build_with_events).
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            sync_debounce_secs: 300, // 5 minutes
            dedup_window_ms: 5_000,
            undecodable_entries: UndecodablePolicy::DiscardPage,
            event_channel_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.page_size == 0 {
            return Err(SyncError::Config("page_size must be at least 1".into()));
        }
        if self.dedup_window_ms < 0 {
            return Err(SyncError::Config("dedup_window_ms must not be negative".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(SyncError::Config("event_channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_secs(self.sync_debounce_secs)
    }
}
