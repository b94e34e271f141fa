//! Sync coordinator: gates and schedules forward and backward syncs.
//!
//! The coordinator owns the state shared by every conversation of every
//! account:
//! - the per-account archive capability cache
//! - the forward sync debounce clock
//! - the per-conversation locks shared by both controllers
//!
//! Triggers (contact list received, app foreground, scroll to top) call the
//! `request_*` methods, which run each sync on its own tokio task. The
//! `sync_*` methods are the awaited forms and return typed outcomes.

use crate::archive::{ArchiveQueryClient, ConnectivityProbe};
use crate::attachments::{AttachmentProcessor, NoAttachments};
use crate::backward::{BackwardOutcome, BackwardSyncController};
use crate::config::SyncConfig;
use crate::cursor_store::SyncCursorStore;
use crate::dedup::Deduplicator;
use crate::error::{SyncError, SyncResult};
use crate::events::{event_channel, EventSink, SyncEvent};
use crate::extractor::{PassthroughExtractor, PlaintextExtractor};
use crate::forward::{ForwardReport, ForwardSyncController};
use crate::locks::ConversationLocks;
use crate::mapper::ArchiveRecordMapper;
use crate::throttle::SyncThrottle;
use archivesync_storage::LocalMessageStore;
use archivesync_types::{AccountId, Address, Conversation, ConversationKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a sync request did not reach the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The conversation received a forward page within the debounce interval.
    SyncedRecently,
    Offline,
    NotAuthenticated,
    /// The account's server has no message archive.
    Unsupported,
}

/// Outcome of a gated sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome<T> {
    Skipped(SkipReason),
    Completed(T),
}

impl<T> SyncOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            SyncOutcome::Completed(value) => Some(value),
            SyncOutcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncOutcome::Skipped(reason) => Some(*reason),
            SyncOutcome::Completed(_) => None,
        }
    }
}

/// Builds a [`SyncCoordinator`] from its collaborators.
pub struct SyncCoordinatorBuilder {
    config: SyncConfig,
    archive: Arc<dyn ArchiveQueryClient>,
    connectivity: Arc<dyn ConnectivityProbe>,
    store: Arc<dyn LocalMessageStore>,
    extractor: Arc<dyn PlaintextExtractor>,
    attachments: Arc<dyn AttachmentProcessor>,
}

impl SyncCoordinatorBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn PlaintextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn attachments(mut self, attachments: Arc<dyn AttachmentProcessor>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Builds a coordinator that emits no events.
    pub fn build(self) -> SyncResult<SyncCoordinator> {
        self.assemble(EventSink::disabled())
    }

    /// Builds a coordinator together with the receiving end of its event
    /// channel, sized by `event_channel_capacity`. Events that do not fit
    /// are dropped.
    pub fn build_with_events(self) -> SyncResult<(SyncCoordinator, mpsc::Receiver<SyncEvent>)> {
        self.config.validate()?;
        let (tx, rx) = event_channel(self.config.event_channel_capacity);
        let coordinator = self.assemble(EventSink::new(tx))?;
        Ok((coordinator, rx))
    }

    fn assemble(self, events: EventSink) -> SyncResult<SyncCoordinator> {
        self.config.validate()?;

        let locks = ConversationLocks::new();
        let throttle = SyncThrottle::new(self.config.sync_debounce());
        let mapper = ArchiveRecordMapper::new(
            self.extractor,
            self.attachments,
            self.config.undecodable_entries,
        );
        let cursors = SyncCursorStore::new(
            self.store,
            Deduplicator::new(self.config.dedup_window_ms),
            self.config.page_size,
        );

        let forward = ForwardSyncController::new(
            Arc::clone(&self.archive),
            mapper.clone(),
            cursors.clone(),
            locks.clone(),
            throttle.clone(),
            events.clone(),
        );
        let backward = BackwardSyncController::new(
            Arc::clone(&self.archive),
            mapper,
            cursors.clone(),
            locks.clone(),
            events,
        );

        Ok(SyncCoordinator {
            config: self.config,
            archive: self.archive,
            connectivity: self.connectivity,
            cursors,
            forward,
            backward,
            locks,
            throttle,
            capabilities: Mutex::new(HashMap::new()),
        })
    }
}

pub struct SyncCoordinator {
    config: SyncConfig,
    archive: Arc<dyn ArchiveQueryClient>,
    connectivity: Arc<dyn ConnectivityProbe>,
    cursors: SyncCursorStore,
    forward: ForwardSyncController,
    backward: BackwardSyncController,
    locks: ConversationLocks,
    throttle: SyncThrottle,
    /// Archive support per account. Filled by the first successful probe,
    /// cleared when the account authenticates again.
    capabilities: Mutex<HashMap<AccountId, bool>>,
}

impl SyncCoordinator {
    pub fn builder(
        archive: Arc<dyn ArchiveQueryClient>,
        connectivity: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn LocalMessageStore>,
    ) -> SyncCoordinatorBuilder {
        SyncCoordinatorBuilder {
            config: SyncConfig::default(),
            archive,
            connectivity,
            store,
            extractor: Arc::new(PassthroughExtractor),
            attachments: Arc::new(NoAttachments),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cursors(&self) -> &SyncCursorStore {
        &self.cursors
    }

    pub fn locks(&self) -> &ConversationLocks {
        &self.locks
    }

    // ── Capability ──────────────────────────────────────────────

    /// Whether the account's server offers an archive, probing on first use.
    pub async fn is_supported(&self, account: &AccountId) -> bool {
        if let Some(supported) = self.cached_support(account) {
            return supported;
        }
        self.probe_support(account).await
    }

    fn cached_support(&self, account: &AccountId) -> Option<bool> {
        let caps = self.capabilities.lock().unwrap_or_else(PoisonError::into_inner);
        caps.get(account).copied()
    }

    fn cache_support(&self, account: &AccountId, supported: bool) {
        let mut caps = self.capabilities.lock().unwrap_or_else(PoisonError::into_inner);
        caps.insert(account.clone(), supported);
    }

    pub fn invalidate_capability(&self, account: &AccountId) {
        let mut caps = self.capabilities.lock().unwrap_or_else(PoisonError::into_inner);
        caps.remove(account);
    }

    /// Queries the server and caches the answer. A failed probe reports
    /// "unsupported" for this attempt only and is not cached.
    async fn probe_support(&self, account: &AccountId) -> bool {
        let supported = match self.archive.is_supported(account).await {
            Ok(supported) => supported,
            Err(e) => {
                warn!("[SYNC] archive capability probe failed for {}: {}", account, e);
                return false;
            }
        };

        if supported {
            if let Err(e) = self.archive.set_default_retention_policy(account).await {
                warn!("[SYNC] could not set default archiving policy for {}: {}", account, e);
            }
        }

        info!("[SYNC] archive support for {}: {}", account, supported);
        self.cache_support(account, supported);
        supported
    }

    /// Call after the account (re-)authenticated: forgets the cached
    /// capability and probes again in the background.
    pub fn on_authenticated(self: &Arc<Self>, account: AccountId) -> JoinHandle<bool> {
        self.invalidate_capability(&account);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.probe_support(&account).await })
    }

    // ── Forward ─────────────────────────────────────────────────

    /// Catches `conversation` up toward the present if no gate stops it.
    pub async fn sync_forward(
        &self,
        conversation: &Conversation,
    ) -> SyncResult<SyncOutcome<ForwardReport>> {
        let key = conversation.key();
        let account = &conversation.account;

        if self.throttle.synced_recently(&key) {
            debug!("[SYNC] {} synced recently, skipping", key);
            return Ok(SyncOutcome::Skipped(SkipReason::SyncedRecently));
        }
        if !self.connectivity.is_online(account) {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        if !self.connectivity.is_authenticated(account) {
            return Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        }
        if !self.is_supported(account).await {
            return Ok(SyncOutcome::Skipped(SkipReason::Unsupported));
        }

        match self.forward.run_debounced(conversation).await {
            Ok(Some(report)) => Ok(SyncOutcome::Completed(report)),
            Ok(None) => Ok(SyncOutcome::Skipped(SkipReason::SyncedRecently)),
            Err(e) => self.absorb_failure("forward", account, &key, e),
        }
    }

    /// Spawns a forward sync of `conversation`.
    pub fn request_last_history(self: &Arc<Self>, conversation: Conversation) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(SyncOutcome::Skipped(reason)) = this.sync_forward(&conversation).await {
                debug!("[SYNC] forward sync of {} skipped: {:?}", conversation, reason);
            }
        })
    }

    /// Requests forward history for every contact of a freshly received contact list.
    pub fn on_contacts_received(
        self: &Arc<Self>,
        account: AccountId,
        peers: Vec<Address>,
    ) -> Vec<JoinHandle<()>> {
        info!("[SYNC] contact list received for {} ({} contacts)", account, peers.len());
        peers
            .into_iter()
            .map(|peer| self.request_last_history(Conversation::new(account.clone(), peer)))
            .collect()
    }

    // ── Backward ────────────────────────────────────────────────

    /// Loads one page of history older than anything synchronized so far.
    pub async fn sync_backward(
        &self,
        conversation: &Conversation,
    ) -> SyncResult<SyncOutcome<BackwardOutcome>> {
        let key = conversation.key();
        let account = &conversation.account;

        if !self.connectivity.is_online(account) {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        if !self.is_supported(account).await {
            return Ok(SyncOutcome::Skipped(SkipReason::Unsupported));
        }

        match self.backward.run(conversation).await {
            Ok(outcome) => Ok(SyncOutcome::Completed(outcome)),
            Err(e) => self.absorb_failure("backward", account, &key, e),
        }
    }

    /// Spawns a backward sync of `conversation`.
    pub fn request_previous_history(self: &Arc<Self>, conversation: Conversation) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(SyncOutcome::Skipped(reason)) = this.sync_backward(&conversation).await {
                debug!("[SYNC] backward sync of {} skipped: {:?}", conversation, reason);
            }
        })
    }

    /// Logs a failed sync. An archive reporting itself unsupported is
    /// remembered and turned into a skip; everything else is returned.
    fn absorb_failure<T>(
        &self,
        direction: &str,
        account: &AccountId,
        key: &ConversationKey,
        e: SyncError,
    ) -> SyncResult<SyncOutcome<T>> {
        if e.is_unsupported() {
            debug!("[SYNC] archive unsupported for {}", account);
            self.cache_support(account, false);
            return Ok(SyncOutcome::Skipped(SkipReason::Unsupported));
        }
        match &e {
            SyncError::Storage(_) | SyncError::Task(_) => {
                error!("[SYNC] {} sync of {} failed: {}", direction, key, e);
            }
            _ if e.is_query_failure() => {
                warn!("[SYNC] {} query for {} failed: {}", direction, key, e);
            }
            _ => warn!("[SYNC] {} sync of {} failed: {}", direction, key, e),
        }
        Err(e)
    }
}
