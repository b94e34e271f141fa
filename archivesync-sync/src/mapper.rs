//! Conversion of raw archive entries into canonical message records.

use crate::attachments::AttachmentProcessor;
use crate::config::UndecodablePolicy;
use crate::error::{SyncError, SyncResult};
use crate::extractor::{Decoded, PlaintextExtractor};
use archivesync_types::{ArchivePage, ArchivedEntry, ArchivedMessage, Conversation, ForwardedStanza, MessageRecord};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps archive pages to [`MessageRecord`]s for one conversation.
///
/// Under [`UndecodablePolicy::DiscardPage`] a single entry whose envelope
/// cannot be decoded, or that carries a non-plaintext control message, fails
/// the whole page with [`SyncError::DecodeFailure`].
#[derive(Clone)]
pub struct ArchiveRecordMapper {
    extractor: Arc<dyn PlaintextExtractor>,
    attachments: Arc<dyn AttachmentProcessor>,
    policy: UndecodablePolicy,
}

enum EntryBody {
    Text(String),
    Undecodable(String),
}

impl ArchiveRecordMapper {
    pub fn new(
        extractor: Arc<dyn PlaintextExtractor>,
        attachments: Arc<dyn AttachmentProcessor>,
        policy: UndecodablePolicy,
    ) -> Self {
        Self {
            extractor,
            attachments,
            policy,
        }
    }

    /// Maps every message entry of the page, oldest first.
    ///
    /// Entries that do not carry a message stanza are skipped.
    pub fn map_page(
        &self,
        conversation: &Conversation,
        page: &ArchivePage,
    ) -> SyncResult<Vec<MessageRecord>> {
        let mut records = Vec::with_capacity(page.count());

        for (index, entry) in page.entries.iter().enumerate() {
            let ForwardedStanza::Message(message) = &entry.stanza else {
                debug!("[MAPPER] skipping non-message entry {:?}", entry.archive_id);
                continue;
            };

            let text = match self.body_text(message) {
                EntryBody::Text(text) => text,
                EntryBody::Undecodable(reason) => match self.policy {
                    UndecodablePolicy::DiscardPage => {
                        warn!(
                            "[MAPPER] discarding page for {}: entry {} {}",
                            conversation, index, reason
                        );
                        return Err(SyncError::DecodeFailure {
                            entry: index,
                            reason,
                        });
                    }
                    UndecodablePolicy::SkipEntry => {
                        warn!("[MAPPER] skipping entry {} for {}: {}", index, conversation, reason);
                        continue;
                    }
                },
            };

            let mut record = self.build_record(conversation, entry, message, text);
            self.attachments.process(&mut record);
            records.push(record);
        }

        Ok(records)
    }

    fn body_text(&self, message: &ArchivedMessage) -> EntryBody {
        let Some(body) = message.body.as_deref() else {
            return EntryBody::Text(String::new());
        };
        match self.extractor.decode(body) {
            Decoded::Unwrapped => EntryBody::Text(body.to_string()),
            Decoded::PlainText(text) => EntryBody::Text(text),
            Decoded::NotPlainText => EntryBody::Undecodable("is a non-plaintext control message".into()),
            Decoded::DecodeError(e) => EntryBody::Undecodable(format!("failed to decode: {e}")),
        }
    }

    fn build_record(
        &self,
        conversation: &Conversation,
        entry: &ArchivedEntry,
        message: &ArchivedMessage,
        text: String,
    ) -> MessageRecord {
        let mut record = MessageRecord::archived(
            conversation.key(),
            text,
            entry.relay_stamp.timestamp_millis(),
        );
        record.resource = conversation.peer.resource().map(str::to_string);
        record.delay_timestamp = message.delay_stamp.map(|stamp| stamp.timestamp_millis());
        // Two-party rule: anything sent by the peer's bare address is incoming.
        record.incoming = message.from.same_bare(&conversation.peer);
        record.stanza_id = message.stanza_id.clone();
        record
    }
}
