//! Duplicate detection for archived records.
//!
//! The archive's stanza id is not unique, and an outgoing message may already
//! be stored as a local echo when its archived copy arrives. A record is a
//! duplicate when a stored (or earlier accepted) record of the same
//! conversation matches any of:
//!
//! 1. same stanza id and same text, where two missing stanza ids count as
//!    the same
//! 2. same text, primary timestamps within the window
//! 3. same text, the stored primary or delay timestamp within the window of the
//!    incoming delay timestamp

use archivesync_storage::{LocalMessageStore, StorageResult};
use archivesync_types::{ConversationKey, MessageRecord};
use std::fmt;
use tracing::debug;

/// Which duplicate rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateRule {
    StanzaAndText,
    PrimaryTimestamp,
    DelayTimestamp,
}

impl fmt::Display for DuplicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateRule::StanzaAndText => write!(f, "same stanza id and text"),
            DuplicateRule::PrimaryTimestamp => write!(f, "same text and similar timestamp"),
            DuplicateRule::DelayTimestamp => write!(f, "same text and similar delay timestamp"),
        }
    }
}

/// Records of one batch split into survivors and a duplicate count.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub accepted: Vec<MessageRecord>,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    window_ms: i64,
}

impl Deduplicator {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Filters a batch against the store and against records accepted earlier
    /// in the same batch.
    pub fn filter(
        &self,
        store: &dyn LocalMessageStore,
        key: &ConversationKey,
        incoming: Vec<MessageRecord>,
    ) -> StorageResult<DedupOutcome> {
        let mut outcome = DedupOutcome::default();

        for record in incoming {
            let rule = match self.match_stored(store, key, &record)? {
                Some(rule) => Some(rule),
                None => outcome
                    .accepted
                    .iter()
                    .find_map(|accepted| self.matches(accepted, &record)),
            };

            match rule {
                Some(rule) => {
                    debug!(
                        "[DEDUP] dropping record for {} ({}): stanza={:?} ts={} delay={:?}",
                        key, rule, record.stanza_id, record.timestamp, record.delay_timestamp
                    );
                    outcome.duplicates += 1;
                }
                None => outcome.accepted.push(record),
            }
        }

        Ok(outcome)
    }

    /// Checks one record against the stored records of its conversation.
    pub fn match_stored(
        &self,
        store: &dyn LocalMessageStore,
        key: &ConversationKey,
        record: &MessageRecord,
    ) -> StorageResult<Option<DuplicateRule>> {
        if store.find_by_stanza_and_text(key, record.stanza_id.as_deref(), &record.text)? {
            return Ok(Some(DuplicateRule::StanzaAndText));
        }

        let (from, to) = self.window(record.timestamp);
        let near_primary = store.find_by_text_in_time_range(key, &record.text, from, to)?;
        if near_primary
            .iter()
            .any(|stored| self.within(stored.timestamp, record.timestamp))
        {
            return Ok(Some(DuplicateRule::PrimaryTimestamp));
        }

        if let Some(delay) = record.delay_timestamp {
            let (from, to) = self.window(delay);
            if !store
                .find_by_text_in_time_range(key, &record.text, from, to)?
                .is_empty()
            {
                return Ok(Some(DuplicateRule::DelayTimestamp));
            }
        }

        Ok(None)
    }

    /// Checks `candidate` against a single `existing` record.
    pub fn matches(&self, existing: &MessageRecord, candidate: &MessageRecord) -> Option<DuplicateRule> {
        if existing.text != candidate.text {
            return None;
        }
        if existing.stanza_id == candidate.stanza_id {
            return Some(DuplicateRule::StanzaAndText);
        }
        if self.within(existing.timestamp, candidate.timestamp) {
            return Some(DuplicateRule::PrimaryTimestamp);
        }
        if let Some(delay) = candidate.delay_timestamp {
            let near_stored_delay = existing
                .delay_timestamp
                .is_some_and(|stored| self.within(stored, delay));
            if self.within(existing.timestamp, delay) || near_stored_delay {
                return Some(DuplicateRule::DelayTimestamp);
            }
        }
        None
    }

    fn window(&self, at: i64) -> (i64, i64) {
        (at.saturating_sub(self.window_ms), at.saturating_add(self.window_ms))
    }

    fn within(&self, a: i64, b: i64) -> bool {
        a.abs_diff(b) <= self.window_ms.unsigned_abs()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(5_000)
    }
}
