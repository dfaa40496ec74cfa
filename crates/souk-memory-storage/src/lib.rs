//! Memory-based storage implementation for Souk.
//!
//! This crate provides a memory-based storage implementation of the
//! `SoukStorageProvider` trait. State is non-persistent and is cleared when the
//! application terminates; it is useful for tests or for ephemeral sessions.
//!
//! All conversation records and message logs live behind a single
//! `parking_lot::RwLock`, so every mutation (including the combined summary +
//! counter effect of a send) is applied atomically with respect to other writers.
//!
//! ## Memory Exhaustion Protection
//!
//! The following limits are enforced (with configurable defaults via [`ValidationLimits`]):
//!
//! - [`DEFAULT_MAX_MESSAGES_PER_CONVERSATION`]: Maximum messages kept in one log
//! - [`DEFAULT_MAX_TEXT_LENGTH`]: Maximum length of a message text in bytes
//!
//! ```rust
//! use souk_memory_storage::{SoukMemoryStorage, ValidationLimits};
//!
//! let limits = ValidationLimits::default()
//!     .with_cache_size(2000)
//!     .with_max_text_length(1024);
//!
//! let storage = SoukMemoryStorage::with_limits(limits);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;
use souk_storage_traits::conversations::types::Conversation;
use souk_storage_traits::messages::types::{Message, MessageId};
use souk_storage_traits::{
    Backend, ChangeFeed, ConversationId, SoukStorageProvider, StorageChange,
};
use tokio::sync::broadcast;

mod conversations;
mod messages;

/// Default cache size for the message lookup cache
const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(v) => v,
    None => panic!("cache size must be non-zero"),
};

/// Default maximum number of messages kept in a single conversation log.
/// Appends beyond this limit are rejected rather than evicting history.
pub const DEFAULT_MAX_MESSAGES_PER_CONVERSATION: usize = 100_000;

/// Default maximum length of a message text in bytes (not characters).
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 16 * 1024;

/// Configurable validation limits for memory storage.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    /// Maximum number of entries in the message lookup cache
    pub cache_size: usize,
    /// Maximum number of messages kept per conversation
    pub max_messages_per_conversation: usize,
    /// Maximum length of a message text in bytes
    pub max_text_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE.get(),
            max_messages_per_conversation: DEFAULT_MAX_MESSAGES_PER_CONVERSATION,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

impl ValidationLimits {
    /// Creates a new `ValidationLimits` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries in the message lookup cache.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        assert!(size > 0, "cache_size must be greater than 0");
        self.cache_size = size;
        self
    }

    /// Sets the maximum number of messages kept per conversation.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_max_messages_per_conversation(mut self, limit: usize) -> Self {
        assert!(
            limit > 0,
            "max_messages_per_conversation must be greater than 0"
        );
        self.max_messages_per_conversation = limit;
        self
    }

    /// Sets the maximum length of a message text in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_max_text_length(mut self, limit: usize) -> Self {
        assert!(limit > 0, "max_text_length must be greater than 0");
        self.max_text_length = limit;
        self
    }
}

/// A memory-based storage implementation for Souk.
///
/// ## Thread Safety
///
/// State is protected by a `RwLock`, which allows:
/// - Multiple concurrent readers (for find/list operations)
/// - Exclusive writers (for ensure/append/increment/reset operations)
///
/// Because increments run under the write lock they are true deltas: two concurrent
/// sends to the same receiver always add two.
pub struct SoukMemoryStorage {
    /// Configurable validation limits
    limits: ValidationLimits,
    /// Thread-safe inner storage
    inner: RwLock<SoukMemoryStorageInner>,
    /// Announces committed writes
    changes: ChangeFeed,
}

/// Log of one conversation, kept sorted by `(sent_at, seq)`
#[derive(Debug, Default)]
struct ConversationLog {
    messages: Vec<Message>,
    seq_by_id: HashMap<MessageId, u64>,
    next_seq: u64,
}

struct SoukMemoryStorageInner {
    conversations: HashMap<ConversationId, Conversation>,
    logs: HashMap<ConversationId, ConversationLog>,
    message_cache: LruCache<(ConversationId, MessageId), Message>,
}

impl fmt::Debug for SoukMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoukMemoryStorage")
            .field("limits", &self.limits)
            .field("inner", &"RwLock<SoukMemoryStorageInner>")
            .finish()
    }
}

impl Default for SoukMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SoukMemoryStorage {
    /// Creates a new `SoukMemoryStorage` with the default configuration.
    pub fn new() -> Self {
        Self::with_limits(ValidationLimits::default())
    }

    /// Creates a new `SoukMemoryStorage` with the specified cache size.
    pub fn with_cache_size(cache_size: NonZeroUsize) -> Self {
        Self::with_limits(ValidationLimits::default().with_cache_size(cache_size.get()))
    }

    /// Creates a new `SoukMemoryStorage` with the provided validation limits.
    pub fn with_limits(limits: ValidationLimits) -> Self {
        let cache_size = NonZeroUsize::new(limits.cache_size).unwrap_or(DEFAULT_CACHE_SIZE);
        Self {
            limits,
            inner: RwLock::new(SoukMemoryStorageInner {
                conversations: HashMap::new(),
                logs: HashMap::new(),
                message_cache: LruCache::new(cache_size),
            }),
            changes: ChangeFeed::default(),
        }
    }

    /// Returns the current validation limits.
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    fn publish_conversation(&self, conversation: &Conversation) {
        self.changes.publish(StorageChange::ConversationChanged {
            conversation_id: conversation.id.clone(),
            revision: conversation.revision,
        });
    }
}

impl SoukStorageProvider for SoukMemoryStorage {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
