use crate::conversation::ConversationKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A canonical, persisted chat message.
///
/// Timestamps are Unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation: ConversationKey,
    pub resource: Option<String>,
    pub text: String,
    /// Primary time. For archived records: the archive envelope's relay stamp.
    pub timestamp: i64,
    /// Secondary time from the message's own delay marker.
    pub delay_timestamp: Option<i64>,
    pub incoming: bool,
    /// Server-assigned stanza id. Not guaranteed unique.
    pub stanza_id: Option<String>,
    pub from_archive: bool,
    pub read: bool,
    pub sent: bool,
    /// Remote file reference detected by an attachment processor.
    pub attachment_url: Option<String>,
}

impl MessageRecord {
    /// Creates a record received from the message archive (read and sent).
    pub fn archived(conversation: ConversationKey, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation,
            resource: None,
            text: text.into(),
            timestamp,
            delay_timestamp: None,
            incoming: false,
            stanza_id: None,
            from_archive: true,
            read: true,
            sent: true,
            attachment_url: None,
        }
    }

    /// Creates a locally originated record, e.g. the echo of an outgoing message.
    pub fn local(conversation: ConversationKey, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            from_archive: false,
            read: true,
            sent: false,
            ..Self::archived(conversation, text, timestamp)
        }
    }

    pub fn with_stanza_id(mut self, stanza_id: impl Into<String>) -> Self {
        self.stanza_id = Some(stanza_id.into());
        self
    }

    pub fn with_delay_timestamp(mut self, delay_timestamp: i64) -> Self {
        self.delay_timestamp = Some(delay_timestamp);
        self
    }

    pub fn with_incoming(mut self, incoming: bool) -> Self {
        self.incoming = incoming;
        self
    }
}
