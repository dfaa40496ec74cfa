//! Conversation records: creation, the send effect, resets and lookups.
//!
//! Wraps the backend with participant checks and transient-failure retries. The backend
//! itself guarantees atomicity of each call.

use std::sync::Arc;

use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::conversations::types::{Conversation, LastMessage};
use souk_storage_traits::messages::MessageStorage;
use souk_storage_traits::messages::types::Message;
use souk_storage_traits::{ConversationId, Identity, ParticipantPair, SoukStorageProvider};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct ConversationStore {
    storage: Arc<dyn SoukStorageProvider>,
    retry: RetryPolicy,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn SoukStorageProvider>, retry: RetryPolicy) -> Self {
        Self { storage, retry }
    }

    /// Creates the record with zeroed counters if absent, otherwise returns it as stored.
    ///
    /// Concurrent calls for the same pair converge on one record.
    pub async fn ensure_exists(
        &self,
        conversation_id: &ConversationId,
        participants: &ParticipantPair,
    ) -> Result<Conversation> {
        if &participants.conversation_id() != conversation_id {
            return Err(Error::InvalidArgument(format!(
                "participants {} and {} do not belong to conversation {conversation_id}",
                participants.first(),
                participants.second()
            )));
        }
        let participants = participants.clone();
        let conversation = self
            .call("ensure_conversation", move |storage| {
                Ok(storage.ensure_conversation(&participants)?)
            })
            .await?;
        conversation.participant_pair()?;
        Ok(conversation)
    }

    /// Records the send of `message`: the summary moves to it (unless a later message
    /// already holds it) and the receiver's counter goes up by one, atomically.
    pub async fn append_message_effect(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        message: &Message,
    ) -> Result<Conversation> {
        if &message.conversation_id != conversation_id || &message.sender != sender {
            return Err(Error::InvalidArgument(format!(
                "message {} was not sent by {sender} in conversation {conversation_id}",
                message.id
            )));
        }
        self.authorize(conversation_id, sender)?;

        let summary = LastMessage::from_message(message);
        let (id, from) = (conversation_id.clone(), sender.clone());
        let conversation = self
            .call("apply_message_effect", move |storage| {
                Ok(storage.apply_message_effect(&id, &from, summary.clone())?)
            })
            .await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            sender = %sender,
            revision = conversation.revision,
            "applied message effect"
        );
        Ok(conversation)
    }

    /// Sets `identity`'s counter to zero. Returns whether anything changed.
    pub async fn reset_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool> {
        self.authorize(conversation_id, identity)?;
        let (id, who) = (conversation_id.clone(), identity.clone());
        self.call("reset_unread", move |storage| {
            Ok(storage.reset_unread(&id, &who)?)
        })
        .await
    }

    /// Adds one to `identity`'s counter and returns the new value.
    pub async fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32> {
        self.authorize(conversation_id, identity)?;
        let (id, who) = (conversation_id.clone(), identity.clone());
        self.call("increment_unread", move |storage| {
            Ok(storage.increment_unread(&id, &who)?)
        })
        .await
    }

    pub async fn get(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        let id = conversation_id.clone();
        self.call("find_conversation", move |storage| {
            Ok(storage.find_conversation(&id)?)
        })
        .await?
            .ok_or_else(|| Error::NotFound(conversation_id.clone()))
    }

    /// Unordered; sorting is up to the caller.
    pub async fn list_for_participant(&self, identity: &Identity) -> Result<Vec<Conversation>> {
        let who = identity.clone();
        self.call("conversations_for_participant", move |storage| {
            Ok(storage.conversations_for_participant(&who)?)
        })
        .await
    }

    /// Rebuilds the last-message summary from the tail of the log.
    pub async fn repair_last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation> {
        let id = conversation_id.clone();
        let tail = self
            .call("last_message", move |storage| Ok(storage.last_message(&id)?))
            .await?;
        let summary = tail.as_ref().map(LastMessage::from_message);
        let (id, repaired) = (conversation_id.clone(), summary.clone());
        let conversation = self
            .call("set_last_message", move |storage| {
                Ok(storage.set_last_message(&id, repaired.clone())?)
            })
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            has_message = summary.is_some(),
            "repaired last message summary"
        );
        Ok(conversation)
    }

    async fn call<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        F: Fn(&dyn SoukStorageProvider) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        self.retry
            .run(operation, move || op(storage.as_ref()))
            .await
    }

    /// The pair behind `conversation_id`, provided `identity` is part of it.
    pub fn authorize(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<ParticipantPair> {
        let pair = conversation_id.participants()?;
        if !pair.contains(identity) {
            return Err(Error::Permission {
                conversation_id: conversation_id.clone(),
                identity: identity.clone(),
            });
        }
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use souk_memory_storage::SoukMemoryStorage;
    use souk_storage_traits::test_utils::{identity, pair, FlakyStorage};

    use super::*;
    use crate::error::ErrorKind;

    fn store_over<S: SoukStorageProvider + 'static>(storage: Arc<S>) -> ConversationStore {
        ConversationStore::new(storage, RetryPolicy::default())
    }

    #[tokio::test]
    async fn ensure_exists_is_idempotent() {
        let store = store_over(Arc::new(SoukMemoryStorage::new()));
        let pair = pair("u2", "u1");
        let id = pair.conversation_id();

        let first = store.ensure_exists(&id, &pair).await.unwrap();
        let second = store.ensure_exists(&id, &pair).await.unwrap();
        assert_eq!(first, second);
        let listed = store.list_for_participant(&identity("u1")).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn ensure_exists_rejects_mismatched_pair() {
        let store = store_over(Arc::new(SoukMemoryStorage::new()));
        let id = pair("u1", "u2").conversation_id();
        let err = store.ensure_exists(&id, &pair("u1", "u3")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn outsider_cannot_reset() {
        let store = store_over(Arc::new(SoukMemoryStorage::new()));
        let pair = pair("u1", "u2");
        let id = pair.conversation_id();
        store.ensure_exists(&id, &pair).await.unwrap();

        let err = store.reset_unread(&id, &identity("u3")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = store_over(Arc::new(SoukMemoryStorage::new()));
        let id = pair("u1", "u2").conversation_id();
        assert_eq!(store.get(&id).await.unwrap_err(), Error::NotFound(id));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_write_failures_are_retried() {
        let storage = Arc::new(FlakyStorage::new(SoukMemoryStorage::new()));
        let store = store_over(storage.clone());
        let pair = pair("u1", "u2");
        let id = pair.conversation_id();

        storage.fail_next_writes(2);
        store.ensure_exists(&id, &pair).await.unwrap();
        assert_eq!(storage.pending_write_failures(), 0);

        storage.fail_next_writes(2);
        let count = store.increment_unread(&id, &identity("u2")).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn effect_rejects_message_from_other_sender() {
        let store = store_over(Arc::new(SoukMemoryStorage::new()));
        let pair = pair("u1", "u2");
        let id = pair.conversation_id();
        store.ensure_exists(&id, &pair).await.unwrap();

        let message = Message {
            id: "m1".to_string().try_into().unwrap(),
            conversation_id: id.clone(),
            sender: identity("u1"),
            text: "hi".to_string(),
            sent_at: Default::default(),
            seq: 1,
        };
        let err = store
            .append_message_effect(&id, &identity("u2"), &message)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
