//! Memory-based storage implementation of the MessageStorage trait

use souk_storage_traits::messages::error::MessageError;
use souk_storage_traits::messages::types::{Message, MessageId, NewMessage};
use souk_storage_traits::messages::{MessageSortOrder, MessageStorage, Pagination};
use souk_storage_traits::{ConversationId, StorageChange};

use crate::SoukMemoryStorage;

impl MessageStorage for SoukMemoryStorage {
    fn append_message(&self, message: NewMessage) -> Result<Message, MessageError> {
        message.validate()?;
        if message.text.len() > self.limits.max_text_length {
            return Err(MessageError::InvalidParameters(format!(
                "message text exceeds maximum length of {} bytes (got {} bytes)",
                self.limits.max_text_length,
                message.text.len()
            )));
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(MessageError::ConversationNotFound(
                message.conversation_id.clone(),
            ));
        }

        let log = inner
            .logs
            .entry(message.conversation_id.clone())
            .or_default();

        // Retried append of a message that already landed
        if let Some(seq) = log.seq_by_id.get(&message.id) {
            let seq = *seq;
            if let Some(existing) = log.messages.iter().find(|m| m.seq == seq) {
                return Ok(existing.clone());
            }
        }

        if log.messages.len() >= self.limits.max_messages_per_conversation {
            return Err(MessageError::InvalidParameters(format!(
                "conversation {} reached the maximum of {} messages",
                message.conversation_id, self.limits.max_messages_per_conversation
            )));
        }

        log.next_seq += 1;
        let sent_at = log
            .messages
            .last()
            .map_or(message.sent_at, |tail| tail.sent_at.max(message.sent_at));
        let stored = Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: message.sender,
            text: message.text,
            sent_at,
            seq: log.next_seq,
        };
        log.messages.push(stored.clone());
        log.seq_by_id.insert(stored.id.clone(), stored.seq);

        inner.message_cache.put(
            (stored.conversation_id.clone(), stored.id.clone()),
            stored.clone(),
        );

        self.changes.publish(StorageChange::MessageAppended {
            conversation_id: stored.conversation_id.clone(),
            message_id: stored.id.clone(),
            seq: stored.seq,
        });

        Ok(stored)
    }

    fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, MessageError> {
        let key = (conversation_id.clone(), message_id.clone());

        // LRU promotion needs the write lock
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(message) = inner.message_cache.get(&key) {
            return Ok(Some(message.clone()));
        }

        let found = inner.logs.get(conversation_id).and_then(|log| {
            let seq = log.seq_by_id.get(message_id)?;
            log.messages.iter().find(|m| m.seq == *seq).cloned()
        });
        if let Some(message) = &found {
            inner.message_cache.put(key, message.clone());
        }
        Ok(found)
    }

    fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MessageError> {
        let inner = self.inner.read();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(MessageError::ConversationNotFound(conversation_id.clone()));
        }
        Ok(inner
            .logs
            .get(conversation_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default())
    }

    fn messages_page(
        &self,
        conversation_id: &ConversationId,
        pagination: Pagination,
    ) -> Result<Vec<Message>, MessageError> {
        pagination.validate()?;

        let inner = self.inner.read();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(MessageError::ConversationNotFound(conversation_id.clone()));
        }
        let Some(log) = inner.logs.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let page: Vec<Message> = match pagination.sort_order() {
            MessageSortOrder::Ascending => log
                .messages
                .iter()
                .skip(pagination.offset())
                .take(pagination.limit())
                .cloned()
                .collect(),
            MessageSortOrder::Descending => log
                .messages
                .iter()
                .rev()
                .skip(pagination.offset())
                .take(pagination.limit())
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Message>, MessageError> {
        let inner = self.inner.read();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(MessageError::ConversationNotFound(conversation_id.clone()));
        }
        Ok(inner
            .logs
            .get(conversation_id)
            .and_then(|log| log.messages.last().cloned()))
    }
}
