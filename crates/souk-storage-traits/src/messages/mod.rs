//! Messages module
//!
//! This module is responsible for the append-only message log of each conversation.
//!
//! Log order is commit order. Each append lands at the tail: the backend assigns the next
//! sequence and clamps `sent_at` to the tail's, so `(sent_at, seq)` order and `seq`
//! order agree and a reader only ever sees the log grow at the end.

use crate::ConversationId;

pub mod error;
pub mod types;

use self::error::MessageError;
use self::types::*;

/// Default number of messages returned by [`MessageStorage::messages_page`]
pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

/// Upper bound on the page size accepted by [`MessageStorage::messages_page`]
pub const MAX_MESSAGE_LIMIT: usize = 10_000;

/// Sort order for message queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageSortOrder {
    /// Oldest first: `sent_at ASC, seq ASC` (default)
    #[default]
    Ascending,
    /// Newest first: `sent_at DESC, seq DESC`
    Descending,
}

/// Pagination parameters for querying messages
#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    /// Maximum number of messages to return
    pub limit: Option<usize>,
    /// Number of messages to skip
    pub offset: Option<usize>,
    /// Sort order for the query results. Defaults to [`MessageSortOrder::Ascending`].
    pub sort_order: Option<MessageSortOrder>,
}

impl Pagination {
    /// Create a new Pagination with specified limit and offset
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit,
            offset,
            sort_order: None,
        }
    }

    /// Create a new Pagination with specified limit, offset, and sort order
    pub fn with_sort_order(
        limit: Option<usize>,
        offset: Option<usize>,
        sort_order: MessageSortOrder,
    ) -> Self {
        Self {
            limit,
            offset,
            sort_order: Some(sort_order),
        }
    }

    /// Get the limit value, using default if not specified
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT)
    }

    /// Get the offset value, using 0 if not specified
    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Get the sort order, using the default if not specified
    pub fn sort_order(&self) -> MessageSortOrder {
        self.sort_order.unwrap_or_default()
    }

    /// Check the limit against [`MAX_MESSAGE_LIMIT`]
    pub fn validate(&self) -> Result<(), MessageError> {
        let limit = self.limit();
        if limit == 0 || limit > MAX_MESSAGE_LIMIT {
            return Err(MessageError::InvalidParameters(format!(
                "limit must be between 1 and {MAX_MESSAGE_LIMIT}, got {limit}"
            )));
        }
        Ok(())
    }
}

/// Storage traits for the messages module
pub trait MessageStorage {
    /// Append a message to its conversation's log.
    ///
    /// The backend assigns the insertion sequence and stores
    /// `max(message.sent_at, tail.sent_at)` as the effective timestamp, inside the same
    /// write. Blank text is rejected with
    /// [`MessageError::InvalidParameters`] and a missing conversation with
    /// [`MessageError::ConversationNotFound`]. Appending an ID that is already in the
    /// log returns the stored message unchanged, so a retried append never duplicates.
    fn append_message(&self, message: NewMessage) -> Result<Message, MessageError>;

    /// Find a message by ID within a specific conversation
    fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, MessageError>;

    /// The whole log of a conversation in ascending log order
    fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MessageError>;

    /// A page of the log in the requested order
    fn messages_page(
        &self,
        conversation_id: &ConversationId,
        pagination: Pagination,
    ) -> Result<Vec<Message>, MessageError>;

    /// The newest message in log order, if any
    fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Message>, MessageError>;
}
