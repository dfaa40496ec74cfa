//! Live views over the store, driven by the backend change feed.
//!
//! Each subscription registers on the change feed *before* its first read, so no write
//! can slip between the initial snapshot and the first wake-up. After that, every
//! relevant change triggers a full re-read and the snapshot is published only if it moves
//! the subscriber forward.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::conversations::types::Conversation;
use souk_storage_traits::messages::MessageStorage;
use souk_storage_traits::messages::error::MessageError;
use souk_storage_traits::messages::types::Message;
use souk_storage_traits::{ConversationId, Identity, SoukStorageProvider, StorageChange};
use tokio::sync::broadcast::error::RecvError;

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::subscription::Subscription;

const MIN_RESYNC_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct ChangeNotifier {
    storage: Arc<dyn SoukStorageProvider>,
    retry: RetryPolicy,
}

impl ChangeNotifier {
    pub fn new(storage: Arc<dyn SoukStorageProvider>, retry: RetryPolicy) -> Self {
        Self { storage, retry }
    }

    /// Snapshots of one conversation record, in strictly increasing revision order.
    ///
    /// Nothing is delivered until the record exists.
    pub fn subscribe_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Subscription<Conversation> {
        let storage = self.storage.clone();
        let retry = self.retry;
        Subscription::spawn(move |publisher| async move {
            let mut last_revision = 0u64;
            let id = conversation_id.clone();
            follow(
                storage,
                retry,
                "subscribe_conversation",
                move |change| {
                    matches!(change, StorageChange::ConversationChanged { .. })
                        && change.conversation_id() == &conversation_id
                },
                move |storage| Ok(storage.find_conversation(&id)?),
                move |snapshot| {
                    let Some(conversation) = snapshot else {
                        return;
                    };
                    if conversation.revision > last_revision {
                        last_revision = conversation.revision;
                        publisher.publish(conversation);
                    }
                },
            )
            .await;
        })
    }

    /// Every conversation `identity` takes part in, sorted by id.
    ///
    /// Records are merged per conversation by revision, so a snapshot never contains a
    /// record older than one already delivered.
    pub fn subscribe_participant_conversations(
        &self,
        identity: Identity,
    ) -> Subscription<Vec<Conversation>> {
        let storage = self.storage.clone();
        let retry = self.retry;
        Subscription::spawn(move |publisher| async move {
            let mut known: BTreeMap<ConversationId, Conversation> = BTreeMap::new();
            let mut delivered = false;
            let member = identity.clone();
            follow(
                storage,
                retry,
                "subscribe_participant_conversations",
                move |change| {
                    if !matches!(change, StorageChange::ConversationChanged { .. }) {
                        return false;
                    }
                    // Keys that do not parse cannot be filtered; re-read to be safe.
                    change
                        .conversation_id()
                        .participants()
                        .map(|pair| pair.contains(&member))
                        .unwrap_or(true)
                },
                move |storage| Ok(storage.conversations_for_participant(&identity)?),
                move |conversations| {
                    let mut changed = !delivered;
                    for conversation in conversations {
                        let newer = known
                            .get(&conversation.id)
                            .is_none_or(|current| conversation.revision > current.revision);
                        if newer {
                            known.insert(conversation.id.clone(), conversation);
                            changed = true;
                        }
                    }
                    if changed {
                        delivered = true;
                        publisher.publish(known.values().cloned().collect());
                    }
                },
            )
            .await;
        })
    }

    /// The full message log of a conversation, ordered by `(sent_at, seq)`.
    ///
    /// A snapshot is delivered only when the log has grown; a conversation that does not
    /// exist yet reads as an empty log.
    pub fn subscribe_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Subscription<Vec<Message>> {
        let storage = self.storage.clone();
        let retry = self.retry;
        Subscription::spawn(move |publisher| async move {
            let mut delivered: Option<usize> = None;
            let id = conversation_id.clone();
            follow(
                storage,
                retry,
                "subscribe_messages",
                move |change| {
                    matches!(change, StorageChange::MessageAppended { .. })
                        && change.conversation_id() == &conversation_id
                },
                move |storage| match storage.messages(&id) {
                    Ok(messages) => Ok(messages),
                    Err(MessageError::ConversationNotFound(_)) => Ok(Vec::new()),
                    Err(e) => Err(e.into()),
                },
                move |messages| {
                    let grew = delivered.is_none_or(|len| messages.len() > len);
                    if grew {
                        delivered = Some(messages.len());
                        publisher.publish(messages);
                    }
                },
            )
            .await;
        })
    }
}

/// Read, deliver, then sleep until a relevant change arrives; forever.
///
/// Transient read failures are retried with the policy and then retried again after a
/// pause, so a subscription survives a backend outage without caller involvement.
/// Permanent failures are logged and the subscription waits for the next change.
async fn follow<T, Relevant, Read, Deliver>(
    storage: Arc<dyn SoukStorageProvider>,
    retry: RetryPolicy,
    operation: &'static str,
    relevant: Relevant,
    read: Read,
    mut deliver: Deliver,
) where
    Relevant: Fn(&StorageChange) -> bool + Send + Sync,
    Read: Fn(&dyn SoukStorageProvider) -> Result<T> + Send + Sync + 'static,
    Deliver: FnMut(T) + Send,
    T: Send + 'static,
{
    let mut changes = storage.subscribe_changes();
    let read = Arc::new(read);
    loop {
        let attempt = {
            let (storage, read) = (storage.clone(), read.clone());
            move || read(storage.as_ref())
        };
        match retry.run(operation, attempt).await {
            Ok(snapshot) => deliver(snapshot),
            Err(e) if e.is_retryable() => {
                tracing::warn!(operation, error = %e, "subscription read failed, resyncing");
                tokio::time::sleep(retry.max_backoff.max(MIN_RESYNC_DELAY)).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "subscription read failed");
            }
        }

        loop {
            match changes.recv().await {
                Ok(change) if relevant(&change) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(operation, skipped, "change feed lagged, re-reading");
                    break;
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}
