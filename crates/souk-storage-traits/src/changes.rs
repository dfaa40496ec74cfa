//! Change feed announcing committed writes

use tokio::sync::broadcast;

use crate::ConversationId;
use crate::messages::types::MessageId;

/// Default number of buffered changes per receiver before it starts lagging
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 1024;

/// A committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChange {
    /// The conversation record was created or mutated
    ConversationChanged {
        /// Conversation that changed
        conversation_id: ConversationId,
        /// Revision of the record after the write
        revision: u64,
    },
    /// A message was appended to the conversation's log
    MessageAppended {
        /// Owning conversation
        conversation_id: ConversationId,
        /// Appended message
        message_id: MessageId,
        /// Insertion sequence assigned by the backend
        seq: u64,
    },
}

impl StorageChange {
    /// The conversation this change belongs to
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::ConversationChanged {
                conversation_id, ..
            } => conversation_id,
            Self::MessageAppended {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Broadcast fan-out of [`StorageChange`]s, owned by a storage backend
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StorageChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` changes per receiver.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to changes published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.sender.subscribe()
    }

    /// Publish a change. Having no receivers is not an error.
    pub fn publish(&self, change: StorageChange) {
        let _ = self.sender.send(change);
    }

    /// Number of live receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
