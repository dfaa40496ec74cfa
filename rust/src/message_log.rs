use std::sync::Arc;

use souk_storage_traits::messages::types::{Message, MessageId, NewMessage};
use souk_storage_traits::messages::{MessageStorage, Pagination};
use souk_storage_traits::{ConversationId, Identity, SoukStorageProvider, Timestamp};

use crate::error::{Error, Result};
use crate::notifier::ChangeNotifier;
use crate::retry::RetryPolicy;
use crate::subscription::Subscription;

/// Append-only message history per conversation.
///
/// Appending does not touch the conversation record; the send path follows up with
/// [`ConversationStore::append_message_effect`](crate::store::ConversationStore::append_message_effect).
#[derive(Clone)]
pub struct MessageLog {
    storage: Arc<dyn SoukStorageProvider>,
    notifier: ChangeNotifier,
    retry: RetryPolicy,
    max_message_length: usize,
}

impl MessageLog {
    pub fn new(
        storage: Arc<dyn SoukStorageProvider>,
        notifier: ChangeNotifier,
        retry: RetryPolicy,
        max_message_length: usize,
    ) -> Self {
        Self {
            storage,
            notifier,
            retry,
            max_message_length,
        }
    }

    /// Appends `text` by `sender`. The message id is fixed before the first attempt so
    /// retries after a lost acknowledgement land on the same record.
    pub async fn append(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        text: &str,
        sent_at: Timestamp,
    ) -> Result<Message> {
        self.validate_text(text)?;
        let pair = conversation_id.participants()?;
        if !pair.contains(sender) {
            return Err(Error::Permission {
                conversation_id: conversation_id.clone(),
                identity: sender.clone(),
            });
        }

        let message = NewMessage {
            id: MessageId::new(uuid::Uuid::new_v4().to_string())?,
            conversation_id: conversation_id.clone(),
            sender: sender.clone(),
            text: text.to_string(),
            sent_at,
        };
        let stored = self
            .call("append_message", move |storage| {
                Ok(storage.append_message(message.clone())?)
            })
            .await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            seq = stored.seq,
            "appended message"
        );
        Ok(stored)
    }

    /// Rejects text that [`Self::append`] would refuse, without touching storage.
    pub fn validate_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "message text must not be empty".to_string(),
            ));
        }
        if text.len() > self.max_message_length {
            return Err(Error::InvalidArgument(format!(
                "message text is {} bytes, limit is {}",
                text.len(),
                self.max_message_length
            )));
        }
        Ok(())
    }

    /// The whole log in `(sent_at, seq)` order.
    pub async fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let id = conversation_id.clone();
        self.call("messages", move |storage| Ok(storage.messages(&id)?))
            .await
    }

    pub async fn page(
        &self,
        conversation_id: &ConversationId,
        pagination: Pagination,
    ) -> Result<Vec<Message>> {
        let id = conversation_id.clone();
        self.call("messages_page", move |storage| {
            Ok(storage.messages_page(&id, pagination)?)
        })
        .await
    }

    pub fn subscribe(&self, conversation_id: ConversationId) -> Subscription<Vec<Message>> {
        self.notifier.subscribe_messages(conversation_id)
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
}

#[cfg(test)]
mod tests {
    use souk_memory_storage::SoukMemoryStorage;
    use souk_storage_traits::conversations::ConversationStorage;
    use souk_storage_traits::messages::MessageSortOrder;
    use souk_storage_traits::test_utils::{identity, pair, FlakyStorage};

    use super::*;
    use crate::error::ErrorKind;

    fn log_over(storage: Arc<dyn SoukStorageProvider>, max_len: usize) -> MessageLog {
        let retry = RetryPolicy::default();
        let notifier = ChangeNotifier::new(storage.clone(), retry);
        MessageLog::new(storage, notifier, retry, max_len)
    }

    fn setup() -> (MessageLog, ConversationId) {
        let storage = Arc::new(SoukMemoryStorage::new());
        let id = storage
            .ensure_conversation(&pair("u1", "u2"))
            .unwrap()
            .id;
        (log_over(storage, 16), id)
    }

    #[tokio::test]
    async fn rejects_blank_and_oversized_text() {
        let (log, id) = setup();
        for text in ["", "   ", "\n\t"] {
            let err = log
                .append(&id, &identity("u1"), text, Timestamp::from_millis(1))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        let err = log
            .append(&id, &identity("u1"), &"x".repeat(17), Timestamp::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(log.messages(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_outsider() {
        let (log, id) = setup();
        let err = log
            .append(&id, &identity("u3"), "hi", Timestamp::from_millis(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn keeps_commit_order_when_stamps_arrive_out_of_order() {
        let (log, id) = setup();
        let u1 = identity("u1");
        let u2 = identity("u2");
        log.append(&id, &u1, "late", Timestamp::from_millis(30)).await.unwrap();
        let early = log
            .append(&id, &u2, "early", Timestamp::from_millis(10))
            .await
            .unwrap();
        log.append(&id, &u1, "next", Timestamp::from_millis(40)).await.unwrap();
        assert_eq!(early.sent_at, Timestamp::from_millis(30));

        let texts: Vec<String> = log
            .messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["late", "early", "next"]);

        let newest = log
            .page(
                &id,
                Pagination::with_sort_order(Some(1), None, MessageSortOrder::Descending),
            )
            .await
            .unwrap();
        assert_eq!(newest[0].text, "next");
    }

    #[tokio::test(start_paused = true)]
    async fn retried_append_is_stored_once() {
        let storage = Arc::new(FlakyStorage::new(SoukMemoryStorage::new()));
        let id = storage
            .ensure_conversation(&pair("u1", "u2"))
            .unwrap()
            .id;
        let log = log_over(storage.clone(), 64);

        storage.fail_next_writes(3);
        let message = log
            .append(&id, &identity("u1"), "hello", Timestamp::from_millis(5))
            .await
            .unwrap();
        assert_eq!(message.seq, 1);
        assert_eq!(log.messages(&id).await.unwrap(), vec![message]);
    }
}
