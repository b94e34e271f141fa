use crate::address::{AccountId, Address};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Uniquely scopes a sync cursor and a message set: (account, bare peer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub account: AccountId,
    /// Bare address of the remote participant.
    pub peer: String,
}

impl ConversationKey {
    pub fn new(account: AccountId, peer: &Address) -> Self {
        Self {
            account,
            peer: peer.bare().to_string(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.peer)
    }
}

/// A two-party conversation as known to the application.
///
/// Unlike [`ConversationKey`] this carries the peer's last known resource,
/// which archived records inherit when mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub account: AccountId,
    pub peer: Address,
}

impl Conversation {
    pub fn new(account: AccountId, peer: Address) -> Self {
        Self { account, peer }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(self.account.clone(), &self.peer)
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account, self.peer)
    }
}
