//! Two-party marketplace conversations: message logs, per-participant unread counters
//! and live inbox/badge views over a pluggable storage backend.

mod chat;
mod clock;
mod config;
mod error;
mod identity;
mod inbox;
mod logging;
mod message_log;
mod notifier;
mod retry;
mod session;
mod store;
mod subscription;
mod unread;

pub use chat::SoukChat;
pub use clock::MonotonicClock;
pub use config::{default_config_json, load_config, ChatConfig, CONFIG_FILE_NAME};
pub use error::{Error, ErrorKind, Result};
pub use identity::{IdentityProvider, SharedIdentityProvider, SwitchableIdentity};
pub use inbox::{project_inbox, InboxEntry};
pub use logging::init_logging;
pub use message_log::MessageLog;
pub use notifier::ChangeNotifier;
pub use retry::RetryPolicy;
pub use session::{ConversationSession, SessionState};
pub use store::ConversationStore;
pub use subscription::Subscription;
pub use unread::UnreadCounter;

pub use souk_storage_traits::conversations::types::{Conversation, LastMessage, UnreadCounts};
pub use souk_storage_traits::messages::types::{Message, MessageId};
pub use souk_storage_traits::messages::{MessageSortOrder, Pagination};
pub use souk_storage_traits::{
    Backend, ConversationId, Identity, ParticipantPair, SoukStorageProvider, Timestamp,
};
