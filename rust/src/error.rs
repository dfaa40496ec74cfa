use souk_storage_traits::conversations::error::ConversationError;
use souk_storage_traits::messages::error::MessageError;
use souk_storage_traits::{ConversationId, Identity};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Transient,
    Permission,
    Integrity,
    SessionClosed,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Rejected synchronously; retrying cannot help.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    /// Backend unavailable. Writes are safe to retry.
    #[error("backend unavailable: {0}")]
    Transient(String),
    #[error("{identity} is not a participant of conversation {conversation_id}")]
    Permission {
        conversation_id: ConversationId,
        identity: Identity,
    },
    /// A stored record violates the two-participant invariant.
    #[error("data integrity violation: {0}")]
    Integrity(String),
    #[error("conversation session is closed")]
    SessionClosed,
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Permission { .. } => ErrorKind::Permission,
            Error::Integrity(_) => ErrorKind::Integrity,
            Error::SessionClosed => ErrorKind::SessionClosed,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<ConversationError> for Error {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::InvalidParameters(msg) => Error::InvalidArgument(msg),
            ConversationError::NotFound(id) => Error::NotFound(id),
            ConversationError::NotParticipant {
                conversation_id,
                identity,
            } => Error::Permission {
                conversation_id,
                identity,
            },
            ConversationError::Integrity(msg) => Error::Integrity(msg),
            ConversationError::Unavailable(msg) => Error::Transient(msg),
            ConversationError::Database(msg) => Error::Storage(msg),
        }
    }
}

impl From<MessageError> for Error {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::InvalidParameters(msg) => Error::InvalidArgument(msg),
            MessageError::ConversationNotFound(id) => Error::NotFound(id),
            MessageError::Unavailable(msg) => Error::Transient(msg),
            MessageError::DatabaseError(msg) => Error::Storage(msg),
        }
    }
}

impl From<souk_sqlite_storage::error::Error> for Error {
    fn from(e: souk_sqlite_storage::error::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
