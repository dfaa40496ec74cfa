//! Memory-based storage implementation of the ConversationStorage trait

use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::conversations::error::ConversationError;
use souk_storage_traits::conversations::types::{Conversation, LastMessage};
use souk_storage_traits::{ConversationId, Identity, ParticipantPair, Timestamp};

use crate::SoukMemoryStorage;

impl ConversationStorage for SoukMemoryStorage {
    fn ensure_conversation(
        &self,
        participants: &ParticipantPair,
    ) -> Result<Conversation, ConversationError> {
        let conversation_id = participants.conversation_id();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let Some(existing) = inner.conversations.get_mut(&conversation_id) else {
            let conversation = Conversation::new(participants, Timestamp::now());
            inner
                .conversations
                .insert(conversation_id, conversation.clone());
            self.publish_conversation(&conversation);
            return Ok(conversation);
        };

        if existing.is_missing_participants() {
            tracing::warn!(
                conversation_id = %existing.id,
                "Backfilling missing participants on existing conversation"
            );
            existing.participants = participants.to_vec();
            for identity in participants.iter() {
                existing.unread_counts.ensure_entry(identity);
            }
            existing.bump_revision();
            let conversation = existing.clone();
            self.publish_conversation(&conversation);
            return Ok(conversation);
        }

        Ok(existing.clone())
    }

    fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationError> {
        let inner = self.inner.read();
        Ok(inner.conversations.get(conversation_id).cloned())
    }

    fn conversations_for_participant(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Conversation>, ConversationError> {
        let inner = self.inner.read();
        Ok(inner
            .conversations
            .values()
            .filter(|conversation| conversation.is_participant(identity))
            .cloned()
            .collect())
    }

    fn apply_message_effect(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        summary: LastMessage,
    ) -> Result<Conversation, ConversationError> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))?;

        // Validate everything before touching the record so a failure leaves it intact
        let pair = conversation.participant_pair()?;
        let receiver = pair
            .counterpart_of(sender)
            .ok_or_else(|| ConversationError::NotParticipant {
                conversation_id: conversation_id.clone(),
                identity: sender.clone(),
            })?
            .clone();

        conversation.update_last_message_if_newer(summary);
        conversation.unread_counts.increment(&receiver);
        conversation.bump_revision();

        let conversation = conversation.clone();
        self.publish_conversation(&conversation);
        Ok(conversation)
    }

    fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32, ConversationError> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))?;

        let count = conversation.unread_counts.increment(identity);
        conversation.bump_revision();
        self.publish_conversation(conversation);
        Ok(count)
    }

    fn reset_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool, ConversationError> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))?;

        if !conversation.unread_counts.reset(identity) {
            return Ok(false);
        }
        conversation.bump_revision();
        self.publish_conversation(conversation);
        Ok(true)
    }

    fn set_last_message(
        &self,
        conversation_id: &ConversationId,
        summary: Option<LastMessage>,
    ) -> Result<Conversation, ConversationError> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))?;

        conversation.last_message = summary;
        conversation.bump_revision();
        let conversation = conversation.clone();
        self.publish_conversation(&conversation);
        Ok(conversation)
    }
}
