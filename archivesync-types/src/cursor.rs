//! Per-conversation synchronization progress.

use crate::archive::ArchivePage;
use serde::{Deserialize, Serialize};

/// Progress markers bounding what has been synchronized for one conversation.
///
/// `last_archive_id` is only advanced by forward pages and `first_archive_id`
/// is only extended by backward pages after its initial assignment.
/// `remote_history_complete` never goes back to `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Newest archive id reached going forward. `None` until forward sync ran.
    pub last_archive_id: Option<String>,
    /// Oldest archive id reached. `None` until a page was ever fetched.
    pub first_archive_id: Option<String>,
    /// Stanza id of the oldest synchronized message (best effort).
    pub first_stanza_id: Option<String>,
    /// No older messages remain on the server.
    pub remote_history_complete: bool,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a page fetched toward the present.
    pub fn apply_forward(&mut self, page: &ArchivePage) {
        if let Some(last) = &page.last_id {
            self.last_archive_id = Some(last.clone());
        }
        if self.first_archive_id.is_none() {
            self.first_archive_id = page.first_id.clone();
            if let Some(stanza_id) = page.oldest_stanza_id() {
                self.first_stanza_id = Some(stanza_id.to_string());
            }
        }
    }

    /// Applies a page fetched into the past.
    ///
    /// A page without a reported first id (an empty page) keeps the current
    /// boundary so the next backward query stays anchored.
    pub fn apply_backward(&mut self, page: &ArchivePage, page_size: usize) {
        if let Some(first) = &page.first_id {
            self.first_archive_id = Some(first.clone());
        }
        if let Some(stanza_id) = page.oldest_stanza_id() {
            self.first_stanza_id = Some(stanza_id.to_string());
        }
        if page.is_partial(page_size) {
            self.remote_history_complete = true;
        }
    }

    pub fn mark_remote_history_complete(&mut self) {
        self.remote_history_complete = true;
    }

    /// True if backward sync has an anchor and the server may hold older messages.
    pub fn can_page_backward(&self) -> bool {
        self.first_archive_id.is_some() && !self.remote_history_complete
    }
}
