//! Notifications emitted while synchronizing.

use archivesync_types::ConversationKey;
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted for the UI. Delivery is best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ForwardSyncStarted { conversation: ConversationKey },
    ForwardSyncFinished { conversation: ConversationKey, succeeded: bool },
    BackwardSyncStarted { conversation: ConversationKey },
    BackwardSyncFinished { conversation: ConversationKey, succeeded: bool },
    /// The server holds no older messages; stop requesting previous history.
    PreviousHistoryComplete { conversation: ConversationKey },
}

/// Creates a bounded event channel.
pub fn event_channel(capacity: usize) -> (mpsc::Sender<SyncEvent>, mpsc::Receiver<SyncEvent>) {
    mpsc::channel(capacity)
}

/// Fire-and-forget sender for [`SyncEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<SyncEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<SyncEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SyncEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            debug!("[SYNC] event dropped: {e}");
        }
    }
}
