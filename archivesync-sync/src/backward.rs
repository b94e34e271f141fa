//! Single-step history backfill into the past.

use crate::archive::ArchiveQueryClient;
use crate::cursor_store::{PageApplication, SyncCursorStore};
use crate::error::SyncResult;
use crate::events::{EventSink, SyncEvent};
use crate::locks::ConversationLocks;
use crate::mapper::ArchiveRecordMapper;
use archivesync_types::Conversation;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one backward sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackwardOutcome {
    /// Neither forward nor backward sync ever fetched a page; nothing to anchor on.
    NoAnchor,
    /// The server holds no older messages. The caller should stop requesting.
    HistoryComplete,
    /// One page was fetched and merged.
    Fetched(PageApplication),
}

#[derive(Clone)]
pub struct BackwardSyncController {
    archive: Arc<dyn ArchiveQueryClient>,
    mapper: ArchiveRecordMapper,
    cursors: SyncCursorStore,
    locks: ConversationLocks,
    events: EventSink,
}

impl BackwardSyncController {
    pub fn new(
        archive: Arc<dyn ArchiveQueryClient>,
        mapper: ArchiveRecordMapper,
        cursors: SyncCursorStore,
        locks: ConversationLocks,
        events: EventSink,
    ) -> Self {
        Self {
            archive,
            mapper,
            cursors,
            locks,
            events,
        }
    }

    /// Fetches the page directly before the oldest synchronized message.
    pub async fn run(&self, conversation: &Conversation) -> SyncResult<BackwardOutcome> {
        let key = conversation.key();
        let _guard = self.locks.acquire(&key).await;

        let cursor = self.cursors.get(&key).await?;
        if cursor.remote_history_complete {
            debug!("[BACKWARD] {} history already complete", key);
            self.events.emit(SyncEvent::PreviousHistoryComplete {
                conversation: key,
            });
            return Ok(BackwardOutcome::HistoryComplete);
        }
        let Some(before) = cursor.first_archive_id else {
            debug!("[BACKWARD] {} has no anchor yet", key);
            return Ok(BackwardOutcome::NoAnchor);
        };

        self.events.emit(SyncEvent::BackwardSyncStarted {
            conversation: key.clone(),
        });
        let result = self.fetch_page(conversation, &before).await;
        self.events.emit(SyncEvent::BackwardSyncFinished {
            conversation: key.clone(),
            succeeded: result.is_ok(),
        });

        match result {
            Ok(applied) => {
                info!(
                    "[BACKWARD] {} loaded previous history: {} stored, {} duplicates",
                    key, applied.stored, applied.duplicates
                );
                if applied.cursor.remote_history_complete {
                    self.events.emit(SyncEvent::PreviousHistoryComplete {
                        conversation: key,
                    });
                }
                Ok(BackwardOutcome::Fetched(applied))
            }
            Err(e) => {
                debug!("[BACKWARD] {} aborted after {:?}", key, e);
                Err(e)
            }
        }
    }

    async fn fetch_page(
        &self,
        conversation: &Conversation,
        before: &str,
    ) -> SyncResult<PageApplication> {
        let key = conversation.key();
        let page_size = self.cursors.page_size();

        let page = self
            .archive
            .query_page_before(conversation, before, page_size)
            .await?;
        debug!(
            "[BACKWARD] {} received {} entries before {} (server total {:?})",
            key,
            page.count(),
            before,
            page.reported_total
        );

        let records = self.mapper.map_page(conversation, &page)?;
        self.cursors.apply_backward(&key, page, records).await
    }
}
