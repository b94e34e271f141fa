//! Shared fixtures for sync integration tests: an in-memory archive, a
//! switchable connectivity probe and a legacy-envelope extractor.

#![allow(dead_code)]

use archivesync_storage::{LocalMessageStore, MessageStore};
use archivesync_sync::{
    ArchiveQueryClient, ArchiveRecordMapper, BackwardSyncController, ConnectivityProbe,
    ConversationLocks, Decoded, Deduplicator, EventSink, ForwardSyncController, NoAttachments,
    PlaintextExtractor, SyncConfig, SyncCoordinator, SyncCursorStore, SyncError, SyncEvent,
    SyncResult, SyncThrottle,
};
use archivesync_types::{
    AccountId, Address, ArchivePage, ArchivedEntry, ArchivedMessage, Conversation,
    ForwardedStanza,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Relay stamp of the first archived entry; later entries are a minute apart.
pub const BASE_TS_MS: i64 = 1_700_000_000_000;

/// Routes sync logs to the test harness. Set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn account() -> AccountId {
    AccountId::new("me@example.org")
}

pub fn me() -> Address {
    Address::parse("me@example.org/laptop").unwrap()
}

pub fn alice() -> Address {
    Address::parse("alice@example.org/phone").unwrap()
}

pub fn bob() -> Address {
    Address::parse("bob@example.org").unwrap()
}

pub fn conversation() -> Conversation {
    Conversation::new(account(), alice())
}

pub fn stamp(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

pub fn archive_id(seq: usize) -> String {
    format!("a{seq:04}")
}

// ── Mock Archive ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Newest,
    After(String),
    Before(String),
}

/// Server-side archive holding ordered entries per bare peer address.
///
/// Archive ids are `a0001`, `a0002`, ... in archival order across all peers.
pub struct MockArchive {
    entries: Mutex<HashMap<String, Vec<ArchivedEntry>>>,
    next_seq: AtomicUsize,
    supported: AtomicBool,
    failing_probes: AtomicUsize,
    probes: AtomicUsize,
    retention_calls: AtomicUsize,
    /// Query log, in call order.
    queries: Mutex<Vec<Query>>,
    /// Errors to return instead of the n-th query (0-based).
    failures: Mutex<HashMap<usize, SyncError>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockArchive {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_seq: AtomicUsize::new(1),
            supported: AtomicBool::new(true),
            failing_probes: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            retention_calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockArchive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Archives `count` messages from `from` in the conversation with `peer`.
    /// Bodies read `msg <seq>`, stanza ids `s<seq>`.
    pub fn push_messages(&self, peer: &Address, from: &Address, count: usize) {
        for _ in 0..count {
            let seq = self.next_seq.load(Ordering::SeqCst);
            self.push_message(peer, from, &format!("msg {seq}"), None);
        }
    }

    /// Archives one message and returns its archive id.
    pub fn push_message(
        &self,
        peer: &Address,
        from: &Address,
        body: &str,
        delay_stamp: Option<DateTime<Utc>>,
    ) -> String {
        let seq = self.next_seq.load(Ordering::SeqCst);
        let stanza = ForwardedStanza::Message(ArchivedMessage {
            stanza_id: Some(format!("s{seq}")),
            from: from.clone(),
            body: Some(body.to_string()),
            delay_stamp,
        });
        self.push_stanza(peer, stanza, stamp(BASE_TS_MS + (seq as i64 - 1) * 60_000))
    }

    /// Archives an arbitrary stanza with an explicit relay stamp.
    pub fn push_stanza(
        &self,
        peer: &Address,
        stanza: ForwardedStanza,
        relay_stamp: DateTime<Utc>,
    ) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = archive_id(seq);
        let entry = ArchivedEntry {
            archive_id: Some(id.clone()),
            relay_stamp,
            stanza,
        };
        self.entries
            .lock()
            .unwrap()
            .entry(peer.bare().to_string())
            .or_default()
            .push(entry);
        id
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// Makes the next `count` capability probes fail.
    pub fn fail_probes(&self, count: usize) {
        self.failing_probes.store(count, Ordering::SeqCst);
    }

    /// Makes the `index`-th query (0-based, all query kinds) fail with `error`.
    pub fn fail_query(&self, index: usize, error: SyncError) {
        self.failures.lock().unwrap().insert(index, error);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn retention_calls(&self) -> usize {
        self.retention_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run_query(
        &self,
        conversation: &Conversation,
        query: Query,
        page_size: usize,
    ) -> SyncResult<ArchivePage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.page(conversation, query, page_size);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn page(
        &self,
        conversation: &Conversation,
        query: Query,
        page_size: usize,
    ) -> SyncResult<ArchivePage> {
        let index = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            queries.len() - 1
        };
        if let Some(error) = self.failures.lock().unwrap().remove(&index) {
            return Err(error);
        }

        let entries = self.entries.lock().unwrap();
        let all = entries
            .get(conversation.peer.bare())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let position = |id: &str| {
            all.iter()
                .position(|e| e.archive_id.as_deref() == Some(id))
                .ok_or_else(|| SyncError::Protocol(format!("item-not-found: {id}")))
        };

        let window = match &query {
            Query::Newest => &all[all.len().saturating_sub(page_size)..],
            Query::After(id) => {
                let start = position(id)? + 1;
                &all[start..(start + page_size).min(all.len())]
            }
            Query::Before(id) => {
                let end = position(id)?;
                &all[end.saturating_sub(page_size)..end]
            }
        };

        let entries = window.to_vec();
        let first_id = entries.first().and_then(|e| e.archive_id.clone());
        let last_id = entries.last().and_then(|e| e.archive_id.clone());
        let mut page = ArchivePage::new(entries, first_id, last_id);
        page.reported_total = Some(all.len() as u64);
        Ok(page)
    }
}

#[async_trait]
impl ArchiveQueryClient for MockArchive {
    async fn is_supported(&self, _account: &AccountId) -> SyncResult<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_probes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_probes.store(failing - 1, Ordering::SeqCst);
            return Err(SyncError::NetworkTimeout);
        }
        Ok(self.supported.load(Ordering::SeqCst))
    }

    async fn query_newest_page(
        &self,
        conversation: &Conversation,
        page_size: usize,
    ) -> SyncResult<ArchivePage> {
        self.run_query(conversation, Query::Newest, page_size).await
    }

    async fn query_page_after(
        &self,
        conversation: &Conversation,
        after_id: &str,
        page_size: usize,
    ) -> SyncResult<ArchivePage> {
        self.run_query(conversation, Query::After(after_id.to_string()), page_size)
            .await
    }

    async fn query_page_before(
        &self,
        conversation: &Conversation,
        before_id: &str,
        page_size: usize,
    ) -> SyncResult<ArchivePage> {
        self.run_query(conversation, Query::Before(before_id.to_string()), page_size)
            .await
    }

    async fn set_default_retention_policy(&self, _account: &AccountId) -> SyncResult<()> {
        self.retention_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Connectivity ────────────────────────────────────────────────

pub struct StaticConnectivity {
    online: AtomicBool,
    authenticated: AtomicBool,
}

impl StaticConnectivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(true),
            authenticated: AtomicBool::new(true),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for StaticConnectivity {
    fn is_online(&self, _account: &AccountId) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_authenticated(&self, _account: &AccountId) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }
}

// ── Extractor ───────────────────────────────────────────────────

/// Understands bodies of the form `?ENC:<text>`. `?ENC:!` is malformed and
/// `?ENC:#...` is a control message.
pub struct EnvelopeExtractor;

impl PlaintextExtractor for EnvelopeExtractor {
    fn decode(&self, body: &str) -> Decoded {
        let Some(inner) = body.strip_prefix("?ENC:") else {
            return Decoded::Unwrapped;
        };
        if inner == "!" {
            Decoded::DecodeError("truncated envelope".into())
        } else if inner.starts_with('#') {
            Decoded::NotPlainText
        } else {
            Decoded::PlainText(inner.to_string())
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────

pub struct Harness {
    pub archive: Arc<MockArchive>,
    pub connectivity: Arc<StaticConnectivity>,
    pub store: Arc<MessageStore>,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        Self {
            archive: MockArchive::new(),
            connectivity: StaticConnectivity::new(),
            store: Arc::new(MessageStore::open_in_memory().unwrap()),
            config,
        }
    }

    pub fn local_store(&self) -> Arc<dyn LocalMessageStore> {
        self.store.clone()
    }

    pub fn cursors(&self) -> SyncCursorStore {
        SyncCursorStore::new(
            self.local_store(),
            Deduplicator::new(self.config.dedup_window_ms),
            self.config.page_size,
        )
    }

    pub fn mapper(&self) -> ArchiveRecordMapper {
        ArchiveRecordMapper::new(
            Arc::new(EnvelopeExtractor),
            Arc::new(NoAttachments),
            self.config.undecodable_entries,
        )
    }

    /// Forward and backward controllers sharing one cursor store and lock set.
    pub fn controllers(&self, events: EventSink) -> (ForwardSyncController, BackwardSyncController) {
        let cursors = self.cursors();
        let locks = ConversationLocks::new();
        let forward = ForwardSyncController::new(
            self.archive.clone(),
            self.mapper(),
            cursors.clone(),
            locks.clone(),
            SyncThrottle::new(self.config.sync_debounce()),
            events.clone(),
        );
        let backward = BackwardSyncController::new(
            self.archive.clone(),
            self.mapper(),
            cursors,
            locks,
            events,
        );
        (forward, backward)
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::new(self.builder().build().unwrap())
    }

    pub fn coordinator_with_events(&self) -> (Arc<SyncCoordinator>, mpsc::Receiver<SyncEvent>) {
        let (coordinator, rx) = self.builder().build_with_events().unwrap();
        (Arc::new(coordinator), rx)
    }

    fn builder(&self) -> archivesync_sync::SyncCoordinatorBuilder {
        SyncCoordinator::builder(
            self.archive.clone(),
            self.connectivity.clone(),
            self.local_store(),
        )
        .config(self.config.clone())
        .extractor(Arc::new(EnvelopeExtractor))
    }

    pub fn stored(&self, conversation: &Conversation) -> usize {
        self.store.count_messages(&conversation.key()).unwrap()
    }
}

/// Drains every event currently buffered in `rx`.
pub fn drain(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
