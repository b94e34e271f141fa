//! Core types for archive history synchronization.
//!
//! - Addresses and account identifiers
//! - Conversation keys scoping cursors and message sets
//! - The persisted per-conversation [`SyncCursor`] and its page transitions
//! - Canonical [`MessageRecord`]s and raw archive pages as returned by a query

mod address;
mod archive;
mod conversation;
mod cursor;
mod message;

pub use address::{AccountId, Address, AddressError};
pub use archive::{ArchivePage, ArchivedEntry, ArchivedMessage, ForwardedStanza};
pub use conversation::{Conversation, ConversationKey};
pub use cursor::SyncCursor;
pub use message::MessageRecord;
