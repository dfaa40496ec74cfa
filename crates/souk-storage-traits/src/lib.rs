//! Souk storage - storage traits and types for two-party marketplace conversations.
//!
//! A backend keeps one [`Conversation`](conversations::types::Conversation) record per
//! participant pair and an append-only message log per conversation. Every committed
//! write is announced on a [`ChangeFeed`] so that live subscriptions can follow the
//! store without polling.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use tokio::sync::broadcast;

pub mod changes;
pub mod conversation_id;
pub mod conversations;
pub mod identity;
pub mod messages;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod timestamp;

pub use changes::{ChangeFeed, StorageChange};
pub use conversation_id::{CONVERSATION_ID_SEPARATOR, ConversationId, ParticipantPair};
pub use identity::Identity;
pub use timestamp::Timestamp;

use self::conversations::ConversationStorage;
use self::messages::MessageStorage;

/// Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Memory
    Memory,
    /// SQLite
    SQLite,
}

impl Backend {
    /// Check if it's a persistent backend
    ///
    /// All values different from [`Backend::Memory`] are considered persistent
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// Storage provider for Souk.
///
/// Combines the conversation record store and the message log. Both live behind a
/// single provider so an implementation can apply the "log append, then summary and
/// counter effect" sequence against one consistent backend.
///
/// Implementors must provide:
/// - Conversation storage with atomic unread-counter deltas
/// - Message storage with backend-assigned insertion sequence numbers
/// - A change feed that announces every committed write
pub trait SoukStorageProvider: ConversationStorage + MessageStorage + Send + Sync {
    /// Returns the backend type.
    fn backend(&self) -> Backend;

    /// Subscribe to the change feed.
    ///
    /// The receiver sees every [`StorageChange`] committed after this call. Receivers
    /// that fall behind get [`broadcast::error::RecvError::Lagged`] and are expected to
    /// re-read the state they care about.
    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_is_persistent() {
        assert!(!Backend::Memory.is_persistent());
        assert!(Backend::SQLite.is_persistent());
    }
}
