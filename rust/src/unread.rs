//! Per-participant unread counters and the "anything unread" badge.
//!
//! Counters only ever move by backend-side deltas (`+1`) or unconditional resets, so
//! sends and reads from different sessions never lose an update to each other.

use souk_storage_traits::{ConversationId, Identity};

use crate::error::Result;
use crate::notifier::ChangeNotifier;
use crate::store::ConversationStore;
use crate::subscription::Subscription;

#[derive(Clone)]
pub struct UnreadCounter {
    store: ConversationStore,
    notifier: ChangeNotifier,
}

impl UnreadCounter {
    pub fn new(store: ConversationStore, notifier: ChangeNotifier) -> Self {
        Self { store, notifier }
    }

    pub async fn increment(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32> {
        self.store.increment_unread(conversation_id, identity).await
    }

    /// Zeroes the counter regardless of its current value. Resetting zero is a no-op.
    pub async fn reset(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool> {
        self.store.reset_unread(conversation_id, identity).await
    }

    /// One-shot read. Use [`Self::subscribe_has_unread`] to keep a badge current.
    pub async fn has_any_unread(&self, identity: &Identity) -> Result<bool> {
        let conversations = self.store.list_for_participant(identity).await?;
        Ok(conversations.iter().any(|c| c.unread_for(identity) > 0))
    }

    pub fn subscribe_has_unread(&self, identity: Identity) -> Subscription<bool> {
        self.notifier
            .subscribe_participant_conversations(identity.clone())
            .map(move |conversations| {
                conversations
                    .iter()
                    .any(|c| c.unread_for(&identity) > 0)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use souk_memory_storage::SoukMemoryStorage;
    use souk_storage_traits::test_utils::{identity, pair};

    use super::*;
    use crate::retry::RetryPolicy;

    async fn counter_with_conversation() -> (UnreadCounter, ConversationId) {
        let storage = Arc::new(SoukMemoryStorage::new());
        let retry = RetryPolicy::default();
        let store = ConversationStore::new(storage.clone(), retry);
        let notifier = ChangeNotifier::new(storage, retry);
        let pair = pair("u1", "u2");
        let id = pair.conversation_id();
        store.ensure_exists(&id, &pair).await.unwrap();
        (UnreadCounter::new(store, notifier), id)
    }

    #[tokio::test]
    async fn concurrent_increments_both_land() {
        let (counter, id) = counter_with_conversation().await;
        let u2 = identity("u2");

        let (a, b) = tokio::join!(counter.increment(&id, &u2), counter.increment(&id, &u2));
        let mut results = vec![a.unwrap(), b.unwrap()];
        results.sort();
        assert_eq!(results, vec![1, 2]);
        assert!(counter.has_any_unread(&u2).await.unwrap());
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let (counter, id) = counter_with_conversation().await;
        let u2 = identity("u2");

        assert!(!counter.reset(&id, &u2).await.unwrap());
        counter.increment(&id, &u2).await.unwrap();
        assert!(counter.reset(&id, &u2).await.unwrap());
        assert!(!counter.reset(&id, &u2).await.unwrap());
        assert!(!counter.has_any_unread(&u2).await.unwrap());
    }

    #[tokio::test]
    async fn badge_follows_counter() {
        let (counter, id) = counter_with_conversation().await;
        let u2 = identity("u2");
        let mut badge = counter.subscribe_has_unread(u2.clone());
        assert_eq!(badge.next().await, Some(false));

        counter.increment(&id, &u2).await.unwrap();
        assert_eq!(badge.wait_for(|on| *on).await, Some(true));

        counter.reset(&id, &u2).await.unwrap();
        assert_eq!(badge.wait_for(|on| !*on).await, Some(false));
    }
}
