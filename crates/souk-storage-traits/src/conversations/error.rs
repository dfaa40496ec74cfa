//! Error types for the conversations module

use thiserror::Error;

use crate::{ConversationId, Identity};

/// Error types for the conversations module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// Invalid parameters (empty identity, same identity twice, malformed key)
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The conversation was never created
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    /// The acting identity is not one of the conversation's participants
    #[error("{identity} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        /// Conversation being accessed
        conversation_id: ConversationId,
        /// Identity that attempted the access
        identity: Identity,
    },

    /// The stored record violates a data-model invariant
    #[error("data integrity violation: {0}")]
    Integrity(String),

    /// The backend is temporarily unavailable
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

impl ConversationError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_error_display() {
        let id: ConversationId = "u1_u2".parse().unwrap();
        let err = ConversationError::NotFound(id.clone());
        assert_eq!(err.to_string(), "conversation not found: u1_u2");

        let err = ConversationError::NotParticipant {
            conversation_id: id,
            identity: Identity::new("u3").unwrap(),
        };
        assert_eq!(err.to_string(), "u3 is not a participant of conversation u1_u2");

        let err = ConversationError::Unavailable("connection reset".to_string());
        assert_eq!(err.to_string(), "storage unavailable: connection reset");
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(ConversationError::Unavailable("busy".to_string()).is_transient());
        assert!(!ConversationError::Database("corrupt".to_string()).is_transient());
        assert!(!ConversationError::Integrity("one participant".to_string()).is_transient());
    }
}
