//! Error types for the messages module

use std::fmt;

use crate::ConversationId;

/// Error types for the messages module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Invalid parameters
    InvalidParameters(String),
    /// The owning conversation does not exist
    ConversationNotFound(ConversationId),
    /// The backend is temporarily unavailable
    Unavailable(String),
    /// Database error
    DatabaseError(String),
}

impl MessageError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl std::error::Error for MessageError {}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameters(message) => write!(f, "Invalid parameters: {}", message),
            Self::ConversationNotFound(id) => write!(f, "Conversation not found: {}", id),
            Self::Unavailable(message) => write!(f, "Storage unavailable: {}", message),
            Self::DatabaseError(message) => write!(f, "Database error: {}", message),
        }
    }
}
