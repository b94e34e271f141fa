//! Message archive synchronization.
//!
//! Keeps the local history of each conversation consistent with the
//! server-side archive:
//!
//! - [`ForwardSyncController`] catches a conversation up toward the present,
//!   starting from the newest page on first sync.
//! - [`BackwardSyncController`] loads one older page per request until the
//!   server reports no more history.
//! - [`SyncCoordinator`] gates both (debounce, connectivity, archive support),
//!   caches capability per account and runs syncs on tokio tasks.
//!
//! Both controllers merge pages through [`SyncCursorStore`], which
//! deduplicates the mapped records and commits them together with the
//! updated [`SyncCursor`](archivesync_types::SyncCursor) in one transaction.

pub mod archive;
pub mod attachments;
pub mod backward;
pub mod config;
pub mod coordinator;
pub mod cursor_store;
pub mod dedup;
pub mod error;
pub mod events;
pub mod extractor;
pub mod forward;
pub mod locks;
pub mod mapper;
pub mod throttle;

pub use archive::{ArchiveQueryClient, ConnectivityProbe};
pub use attachments::{AttachmentProcessor, LinkAttachmentDetector, NoAttachments};
pub use backward::{BackwardOutcome, BackwardSyncController};
pub use config::{SyncConfig, UndecodablePolicy};
pub use coordinator::{SkipReason, SyncCoordinator, SyncCoordinatorBuilder, SyncOutcome};
pub use cursor_store::{PageApplication, SyncCursorStore};
pub use dedup::{DedupOutcome, Deduplicator, DuplicateRule};
pub use error::{SyncError, SyncResult};
pub use events::{event_channel, EventSink, SyncEvent};
pub use extractor::{Decoded, PassthroughExtractor, PlaintextExtractor};
pub use forward::{ForwardReport, ForwardSyncController};
pub use locks::{ConversationGuard, ConversationLocks};
pub use mapper::ArchiveRecordMapper;
pub use throttle::SyncThrottle;
