use std::path::Path;
use std::sync::Arc;

use souk_memory_storage::SoukMemoryStorage;
use souk_sqlite_storage::SoukSqliteStorage;
use souk_storage_traits::conversations::types::Conversation;
use souk_storage_traits::messages::types::Message;
use souk_storage_traits::messages::Pagination;
use souk_storage_traits::{ConversationId, Identity, ParticipantPair, SoukStorageProvider};
use tokio::sync::watch;

use crate::clock::MonotonicClock;
use crate::config::{load_config, ChatConfig};
use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::inbox::{project_inbox, InboxEntry};
use crate::message_log::MessageLog;
use crate::notifier::ChangeNotifier;
use crate::session::ConversationSession;
use crate::store::ConversationStore;
use crate::subscription::{Publisher, Subscription};
use crate::unread::UnreadCounter;

/// Entry point for a UI: opens conversations, sends, and exposes the live inbox and
/// unread badge.
#[derive(Clone)]
pub struct SoukChat {
    storage: Arc<dyn SoukStorageProvider>,
    config: ChatConfig,
    store: ConversationStore,
    log: MessageLog,
    unread: UnreadCounter,
    notifier: ChangeNotifier,
    clock: Arc<MonotonicClock>,
}

impl std::fmt::Debug for SoukChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoukChat")
            .field("backend", &self.storage.backend())
            .field("config", &self.config)
            .finish()
    }
}

impl SoukChat {
    pub fn new(storage: Arc<dyn SoukStorageProvider>) -> Self {
        Self::with_config(storage, ChatConfig::default())
    }

    pub fn with_config(storage: Arc<dyn SoukStorageProvider>, config: ChatConfig) -> Self {
        let retry = config.retry_policy();
        let notifier = ChangeNotifier::new(storage.clone(), retry);
        let store = ConversationStore::new(storage.clone(), retry);
        let log = MessageLog::new(
            storage.clone(),
            notifier.clone(),
            retry,
            config.max_message_length(),
        );
        let unread = UnreadCounter::new(store.clone(), notifier.clone());
        Self {
            storage,
            config,
            store,
            log,
            unread,
            notifier,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Non-persistent; everything is gone when the value is dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(SoukMemoryStorage::new()))
    }

    /// Opens (or creates) the SQLite-backed state in `data_dir`, honouring
    /// `souk_config.json` if present.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("create {}: {e}", data_dir.display())))?;
        let config = load_config(data_dir);
        let db_path = config.database_path(data_dir);
        let storage = SoukSqliteStorage::new(&db_path)?;
        tracing::info!(path = %db_path.display(), "opened chat database");
        Ok(Self::with_config(Arc::new(storage), config))
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn SoukStorageProvider> {
        &self.storage
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn resolve(&self, a: &Identity, b: &Identity) -> Result<ConversationId> {
        Ok(ConversationId::resolve(a, b)?)
    }

    /// `me` opens the conversation with `with`: creates it if needed and marks it read.
    pub async fn open_conversation(
        &self,
        me: &Identity,
        with: &Identity,
    ) -> Result<ConversationSession> {
        ConversationSession::open(
            me.clone(),
            with.clone(),
            self.store.clone(),
            self.log.clone(),
            self.clock.clone(),
        )
        .await
    }

    pub async fn send_message(
        &self,
        session: &ConversationSession,
        text: &str,
    ) -> Result<Message> {
        session.send(text).await
    }

    /// Sends without opening a session, so the sender's own counter is left alone.
    pub async fn send_direct(
        &self,
        from: &Identity,
        to: &Identity,
        text: &str,
    ) -> Result<Message> {
        let pair = ParticipantPair::new(from.clone(), to.clone())?;
        self.log.validate_text(text)?;
        let conversation_id = pair.conversation_id();
        self.store.ensure_exists(&conversation_id, &pair).await?;
        let message = self
            .log
            .append(&conversation_id, from, text, self.clock.next())
            .await?;
        self.store
            .append_message_effect(&conversation_id, from, &message)
            .await?;
        Ok(message)
    }

    /// Log page of the conversation between `me` and `with`.
    pub async fn messages(
        &self,
        me: &Identity,
        with: &Identity,
        pagination: Pagination,
    ) -> Result<Vec<Message>> {
        let conversation_id = self.resolve(me, with)?;
        self.log.page(&conversation_id, pagination).await
    }

    pub async fn conversation(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        self.store.get(conversation_id).await
    }

    pub async fn inbox(&self, identity: &Identity) -> Result<Vec<InboxEntry>> {
        let conversations = self.store.list_for_participant(identity).await?;
        Ok(project_inbox(identity, &conversations))
    }

    pub async fn has_any_unread(&self, identity: &Identity) -> Result<bool> {
        self.unread.has_any_unread(identity).await
    }

    pub async fn repair_last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation> {
        self.store.repair_last_message(conversation_id).await
    }

    pub fn subscribe_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Subscription<Conversation> {
        self.notifier.subscribe_conversation(conversation_id)
    }

    pub fn subscribe_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Subscription<Vec<Message>> {
        self.log.subscribe(conversation_id)
    }

    /// Live inbox, unread first then most recent.
    pub fn subscribe_inbox_list(&self, identity: Identity) -> Subscription<Vec<InboxEntry>> {
        self.notifier
            .subscribe_participant_conversations(identity.clone())
            .map(move |conversations| project_inbox(&identity, conversations))
    }

    pub fn subscribe_has_unread(&self, identity: Identity) -> Subscription<bool> {
        self.unread.subscribe_has_unread(identity)
    }

    /// Inbox of whoever is signed in; empty while nobody is.
    pub fn subscribe_current_inbox(
        &self,
        provider: &dyn IdentityProvider,
    ) -> Subscription<Vec<InboxEntry>> {
        let chat = self.clone();
        let identities = provider.subscribe_identity();
        Subscription::spawn(move |publisher| {
            follow_identity(identities, publisher, Vec::new(), move |identity| {
                chat.subscribe_inbox_list(identity)
            })
        })
    }

    /// Badge of whoever is signed in; `false` while nobody is.
    pub fn subscribe_current_has_unread(
        &self,
        provider: &dyn IdentityProvider,
    ) -> Subscription<bool> {
        let chat = self.clone();
        let identities = provider.subscribe_identity();
        Subscription::spawn(move |publisher| {
            follow_identity(identities, publisher, false, move |identity| {
                chat.subscribe_has_unread(identity)
            })
        })
    }
}

/// Forwards the subscription of the current identity, replacing it on every identity
/// change and publishing `signed_out` while there is none.
async fn follow_identity<T, F>(
    mut identities: watch::Receiver<Option<Identity>>,
    publisher: Publisher<T>,
    signed_out: T,
    subscribe: F,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(Identity) -> Subscription<T> + Send,
{
    loop {
        let current = identities.borrow_and_update().clone();
        let Some(identity) = current else {
            publisher.publish_if_changed(signed_out.clone());
            if identities.changed().await.is_err() {
                return;
            }
            continue;
        };

        tracing::debug!(identity = %identity, "following identity");
        let mut inner = subscribe(identity);
        loop {
            tokio::select! {
                changed = identities.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                next = inner.next() => match next {
                    Some(value) => publisher.publish_if_changed(value),
                    None => {
                        if identities.changed().await.is_err() {
                            return;
                        }
                        break;
                    }
                },
            }
        }
    }
}
