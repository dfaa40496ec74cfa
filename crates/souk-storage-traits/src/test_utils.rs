//! Test utilities shared by the storage backends and the core crate

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;

use crate::conversations::ConversationStorage;
use crate::conversations::error::ConversationError;
use crate::conversations::types::{Conversation, LastMessage};
use crate::messages::MessageStorage;
use crate::messages::error::MessageError;
use crate::messages::types::{Message, MessageId, NewMessage};
use crate::messages::Pagination;
use crate::{
    Backend, ConversationId, Identity, ParticipantPair, SoukStorageProvider, StorageChange,
    Timestamp,
};

/// Parse an identity, panicking on invalid input
pub fn identity(value: &str) -> Identity {
    Identity::new(value).expect("valid test identity")
}

/// Build a participant pair, panicking on invalid input
pub fn pair(a: &str, b: &str) -> ParticipantPair {
    ParticipantPair::new(identity(a), identity(b)).expect("valid test pair")
}

/// Build a message ready to append
pub fn new_message(
    conversation_id: &ConversationId,
    id: &str,
    sender: &str,
    text: &str,
    sent_at: u64,
) -> NewMessage {
    NewMessage {
        id: MessageId::new(id).expect("valid test message id"),
        conversation_id: conversation_id.clone(),
        sender: identity(sender),
        text: text.to_string(),
        sent_at: Timestamp::from_millis(sent_at),
    }
}

/// Storage wrapper that fails a configurable number of upcoming calls with a
/// transient error before delegating to the wrapped backend.
#[derive(Debug)]
pub struct FlakyStorage<S> {
    inner: S,
    failing_writes: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl<S> FlakyStorage<S> {
    /// Wrap a backend; no failures are scheduled initially
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_writes: AtomicUsize::new(0),
            failing_reads: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` write calls
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` read calls
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Number of scheduled write failures not yet consumed
    pub fn pending_write_failures(&self) -> usize {
        self.failing_writes.load(Ordering::SeqCst)
    }

    /// The wrapped backend
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn write_gate(&self) -> Result<(), String> {
        if Self::take(&self.failing_writes) {
            return Err("injected write failure".to_string());
        }
        Ok(())
    }

    fn read_gate(&self) -> Result<(), String> {
        if Self::take(&self.failing_reads) {
            return Err("injected read failure".to_string());
        }
        Ok(())
    }
}

impl<S> ConversationStorage for FlakyStorage<S>
where
    S: ConversationStorage,
{
    fn ensure_conversation(
        &self,
        participants: &ParticipantPair,
    ) -> Result<Conversation, ConversationError> {
        self.write_gate().map_err(ConversationError::Unavailable)?;
        self.inner.ensure_conversation(participants)
    }

    fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationError> {
        self.read_gate().map_err(ConversationError::Unavailable)?;
        self.inner.find_conversation(conversation_id)
    }

    fn conversations_for_participant(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Conversation>, ConversationError> {
        self.read_gate().map_err(ConversationError::Unavailable)?;
        self.inner.conversations_for_participant(identity)
    }

    fn apply_message_effect(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        summary: LastMessage,
    ) -> Result<Conversation, ConversationError> {
        self.write_gate().map_err(ConversationError::Unavailable)?;
        self.inner
            .apply_message_effect(conversation_id, sender, summary)
    }

    fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32, ConversationError> {
        self.write_gate().map_err(ConversationError::Unavailable)?;
        self.inner.increment_unread(conversation_id, identity)
    }

    fn reset_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool, ConversationError> {
        self.write_gate().map_err(ConversationError::Unavailable)?;
        self.inner.reset_unread(conversation_id, identity)
    }

    fn set_last_message(
        &self,
        conversation_id: &ConversationId,
        summary: Option<LastMessage>,
    ) -> Result<Conversation, ConversationError> {
        self.write_gate().map_err(ConversationError::Unavailable)?;
        self.inner.set_last_message(conversation_id, summary)
    }
}

impl<S> MessageStorage for FlakyStorage<S>
where
    S: MessageStorage,
{
    fn append_message(&self, message: NewMessage) -> Result<Message, MessageError> {
        self.write_gate().map_err(MessageError::Unavailable)?;
        self.inner.append_message(message)
    }

    fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, MessageError> {
        self.read_gate().map_err(MessageError::Unavailable)?;
        self.inner.find_message(conversation_id, message_id)
    }

    fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MessageError> {
        self.read_gate().map_err(MessageError::Unavailable)?;
        self.inner.messages(conversation_id)
    }

    fn messages_page(
        &self,
        conversation_id: &ConversationId,
        pagination: Pagination,
    ) -> Result<Vec<Message>, MessageError> {
        self.read_gate().map_err(MessageError::Unavailable)?;
        self.inner.messages_page(conversation_id, pagination)
    }

    fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Message>, MessageError> {
        self.read_gate().map_err(MessageError::Unavailable)?;
        self.inner.last_message(conversation_id)
    }
}

impl<S> SoukStorageProvider for FlakyStorage<S>
where
    S: SoukStorageProvider,
{
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.inner.subscribe_changes()
    }
}
