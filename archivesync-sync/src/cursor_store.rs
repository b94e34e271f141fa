//! Persisted per-conversation sync cursors and atomic page application.

use crate::dedup::Deduplicator;
use crate::error::{SyncError, SyncResult};
use archivesync_storage::{LocalMessageStore, StorageError};
use archivesync_types::{ArchivePage, ConversationKey, MessageRecord, SyncCursor};
use std::sync::Arc;

/// What a single page application changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageApplication {
    /// The cursor as committed together with the page.
    pub cursor: SyncCursor,
    pub stored: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward { completes_history: bool },
    Backward,
}

/// Async facade over the blocking store for cursor reads and page commits.
///
/// A page application deduplicates the mapped records, derives the next cursor
/// and commits both in one storage transaction. Callers hold the
/// conversation's lock, so the read-modify-write of the cursor is not raced.
#[derive(Clone)]
pub struct SyncCursorStore {
    store: Arc<dyn LocalMessageStore>,
    dedup: Deduplicator,
    page_size: usize,
}

impl SyncCursorStore {
    pub fn new(store: Arc<dyn LocalMessageStore>, dedup: Deduplicator, page_size: usize) -> Self {
        Self {
            store,
            dedup,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the cursor, creating an empty one on first access.
    pub async fn get(&self, key: &ConversationKey) -> SyncResult<SyncCursor> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        run_blocking(move || store.cursor(&key)).await
    }

    /// Merges a forward page and advances `last_archive_id`.
    ///
    /// `completes_history` also marks the remote history complete in the same
    /// commit (first forward run that received a partial page).
    pub async fn apply_forward(
        &self,
        key: &ConversationKey,
        page: ArchivePage,
        records: Vec<MessageRecord>,
        completes_history: bool,
    ) -> SyncResult<PageApplication> {
        self.apply(key, page, records, Direction::Forward { completes_history })
            .await
    }

    /// Merges a backward page and moves `first_archive_id` into the past.
    pub async fn apply_backward(
        &self,
        key: &ConversationKey,
        page: ArchivePage,
        records: Vec<MessageRecord>,
    ) -> SyncResult<PageApplication> {
        self.apply(key, page, records, Direction::Backward).await
    }

    pub async fn mark_remote_history_complete(&self, key: &ConversationKey) -> SyncResult<()> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        run_blocking(move || store.mark_remote_history_complete(&key)).await
    }

    async fn apply(
        &self,
        key: &ConversationKey,
        page: ArchivePage,
        records: Vec<MessageRecord>,
        direction: Direction,
    ) -> SyncResult<PageApplication> {
        let store = Arc::clone(&self.store);
        let dedup = self.dedup;
        let page_size = self.page_size;
        let key = key.clone();

        run_blocking(move || {
            let merged = dedup.filter(&*store, &key, records)?;
            let mut cursor = store.cursor(&key)?;
            match direction {
                Direction::Forward { completes_history } => {
                    cursor.apply_forward(&page);
                    if completes_history {
                        cursor.mark_remote_history_complete();
                    }
                }
                Direction::Backward => cursor.apply_backward(&page, page_size),
            }
            store.commit_page(&key, &merged.accepted, &cursor)?;
            Ok(PageApplication {
                cursor,
                stored: merged.accepted.len(),
                duplicates: merged.duplicates,
            })
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Task(format!("storage task panicked: {e}")))?
        .map_err(SyncError::from)
}
