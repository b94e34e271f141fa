//! Raw archive pages as delivered by an archive query.

use crate::address::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of archived entries, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchivePage {
    pub entries: Vec<ArchivedEntry>,
    /// Archive id of the first (oldest) entry, as reported by the server.
    pub first_id: Option<String>,
    /// Archive id of the last (newest) entry, as reported by the server.
    pub last_id: Option<String>,
    /// Total size of the queried result set, when the server reports it.
    pub reported_total: Option<u64>,
}

impl ArchivePage {
    pub fn new(entries: Vec<ArchivedEntry>, first_id: Option<String>, last_id: Option<String>) -> Self {
        Self {
            entries,
            first_id,
            last_id,
            reported_total: None,
        }
    }

    /// Number of entries actually received.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// True if the page holds fewer entries than were requested.
    pub fn is_partial(&self, page_size: usize) -> bool {
        self.count() < page_size
    }

    /// Stanza id of the oldest entry in the page.
    pub fn oldest_stanza_id(&self) -> Option<&str> {
        self.entries.first().and_then(|e| e.stanza.stanza_id())
    }
}

/// An archived stanza wrapped in the archive's relay envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEntry {
    /// Per-entry archive id.
    pub archive_id: Option<String>,
    /// Relay-delay marker of the archive envelope: when the archive stored it.
    pub relay_stamp: DateTime<Utc>,
    pub stanza: ForwardedStanza,
}

/// The stanza carried inside an archive envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ForwardedStanza {
    Message(ArchivedMessage),
    /// Anything that is not a message (presence, iq). Never mapped to a record.
    Other { stanza_id: Option<String> },
}

impl ForwardedStanza {
    pub fn stanza_id(&self) -> Option<&str> {
        match self {
            ForwardedStanza::Message(m) => m.stanza_id.as_deref(),
            ForwardedStanza::Other { stanza_id } => stanza_id.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    /// Application-level stanza id. Not unique across the archive.
    pub stanza_id: Option<String>,
    pub from: Address,
    pub body: Option<String>,
    /// The message's own delay marker (e.g. set by an offline store).
    pub delay_stamp: Option<DateTime<Utc>>,
}
