//! Abstract archive query interface and connectivity probe.
//!
//! The archive protocol (capability negotiation, query execution,
//! authentication, timeouts) lives behind these traits. Implementations report
//! timeouts as [`SyncError::NetworkTimeout`](crate::SyncError::NetworkTimeout)
//! and rejected queries as [`SyncError::Protocol`](crate::SyncError::Protocol);
//! nothing here retries.

use crate::error::SyncResult;
use archivesync_types::{AccountId, ArchivePage, Conversation};
use async_trait::async_trait;

/// Paged access to the server-side message archive.
///
/// Every returned page is ordered oldest first.
#[async_trait]
pub trait ArchiveQueryClient: Send + Sync {
    /// Whether the account's server offers a message archive.
    async fn is_supported(&self, account: &AccountId) -> SyncResult<bool>;

    /// The newest `page_size` archived messages of the conversation.
    async fn query_newest_page(
        &self,
        conversation: &Conversation,
        page_size: usize,
    ) -> SyncResult<ArchivePage>;

    /// Up to `page_size` messages archived directly after `after_id`.
    async fn query_page_after(
        &self,
        conversation: &Conversation,
        after_id: &str,
        page_size: usize,
    ) -> SyncResult<ArchivePage>;

    /// Up to `page_size` messages archived directly before `before_id`.
    async fn query_page_before(
        &self,
        conversation: &Conversation,
        before_id: &str,
        page_size: usize,
    ) -> SyncResult<ArchivePage>;

    /// Asks the server to archive every message by default.
    async fn set_default_retention_policy(&self, account: &AccountId) -> SyncResult<()>;
}

/// Account connection state as seen by the application.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self, account: &AccountId) -> bool;

    fn is_authenticated(&self, account: &AccountId) -> bool;
}
