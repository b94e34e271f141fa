//! Catch-up synchronization toward the present.
//!
//! The loop condition is evaluated against the pivot read *before* the page
//! was fetched. A conversation that has never been synchronized therefore
//! fetches exactly one page (the newest) per invocation, however large the
//! backlog: a first open shows recent messages at once. Only a later
//! invocation, once a pivot exists, keeps paging forward until a partial page
//! signals that the present has been reached. The history older than that
//! first page is left to backward sync.

use crate::archive::ArchiveQueryClient;
use crate::cursor_store::SyncCursorStore;
use crate::error::SyncResult;
use crate::events::{EventSink, SyncEvent};
use crate::locks::ConversationLocks;
use crate::mapper::ArchiveRecordMapper;
use crate::throttle::SyncThrottle;
use archivesync_types::{Conversation, SyncCursor};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one forward sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReport {
    /// The conversation had no pivot when the invocation started.
    pub first_run: bool,
    pub pages: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub cursor: SyncCursor,
}

#[derive(Clone)]
pub struct ForwardSyncController {
    archive: Arc<dyn ArchiveQueryClient>,
    mapper: ArchiveRecordMapper,
    cursors: SyncCursorStore,
    locks: ConversationLocks,
    throttle: SyncThrottle,
    events: EventSink,
}

impl ForwardSyncController {
    pub fn new(
        archive: Arc<dyn ArchiveQueryClient>,
        mapper: ArchiveRecordMapper,
        cursors: SyncCursorStore,
        locks: ConversationLocks,
        throttle: SyncThrottle,
        events: EventSink,
    ) -> Self {
        Self {
            archive,
            mapper,
            cursors,
            locks,
            throttle,
            events,
        }
    }

    /// Runs one forward sync of `conversation`.
    ///
    /// A failed query or page aborts the loop; pages committed before the
    /// failure stay committed and the cursor reflects the last of them.
    pub async fn run(&self, conversation: &Conversation) -> SyncResult<ForwardReport> {
        let _guard = self.locks.acquire(&conversation.key()).await;
        self.run_locked(conversation).await
    }

    /// Like [`run`](Self::run), but returns `None` without querying when the
    /// conversation received a forward page within the debounce interval.
    /// The check is made while holding the conversation lock, so a trigger
    /// queued behind a running sync sees that sync's pages.
    pub async fn run_debounced(
        &self,
        conversation: &Conversation,
    ) -> SyncResult<Option<ForwardReport>> {
        let key = conversation.key();
        let _guard = self.locks.acquire(&key).await;
        if self.throttle.synced_recently(&key) {
            debug!("[FORWARD] {} synced recently, skipping", key);
            return Ok(None);
        }
        self.run_locked(conversation).await.map(Some)
    }

    async fn run_locked(&self, conversation: &Conversation) -> SyncResult<ForwardReport> {
        let key = conversation.key();
        self.events.emit(SyncEvent::ForwardSyncStarted {
            conversation: key.clone(),
        });
        let result = self.fetch_pages(conversation).await;
        self.events.emit(SyncEvent::ForwardSyncFinished {
            conversation: key.clone(),
            succeeded: result.is_ok(),
        });

        match &result {
            Ok(report) => info!(
                "[FORWARD] {} done: {} pages, {} stored, {} duplicates",
                key, report.pages, report.stored, report.duplicates
            ),
            Err(e) => debug!("[FORWARD] {} aborted after {:?}", key, e),
        }
        result
    }

    async fn fetch_pages(&self, conversation: &Conversation) -> SyncResult<ForwardReport> {
        let key = conversation.key();
        let page_size = self.cursors.page_size();
        let cursor = self.cursors.get(&key).await?;

        let mut pivot = cursor.last_archive_id.clone();
        let mut report = ForwardReport {
            first_run: pivot.is_none(),
            pages: 0,
            stored: 0,
            duplicates: 0,
            cursor,
        };

        loop {
            let page = match pivot.as_deref() {
                None => self.archive.query_newest_page(conversation, page_size).await?,
                Some(after) => {
                    self.archive
                        .query_page_after(conversation, after, page_size)
                        .await?
                }
            };
            self.throttle.mark_synced(&key);
            report.pages += 1;

            let count = page.count();
            debug!("[FORWARD] {} received {} entries after {:?}", key, count, pivot);

            let records = self.mapper.map_page(conversation, &page)?;
            let completes_history = pivot.is_none() && count < page_size;
            let applied = self
                .cursors
                .apply_forward(&key, page, records, completes_history)
                .await?;

            report.stored += applied.stored;
            report.duplicates += applied.duplicates;
            let prev_pivot = pivot;
            pivot = applied.cursor.last_archive_id.clone();
            report.cursor = applied.cursor;

            if completes_history {
                info!("[FORWARD] {} remote history completely loaded", key);
            }
            if prev_pivot.is_none() || count != page_size {
                break;
            }
            if pivot == prev_pivot {
                warn!("[FORWARD] {} full page did not advance the pivot, stopping", key);
                break;
            }
        }

        Ok(report)
    }
}
