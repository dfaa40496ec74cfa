//! Types for the messages module

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ConversationId, Identity, Timestamp};

use super::error::MessageError;

/// Message ID, unique within its conversation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Create a message ID from a non-empty string
    pub fn new<S>(value: S) -> Result<Self, MessageError>
    where
        S: Into<String>,
    {
        let value: String = value.into();
        if value.trim().is_empty() {
            return Err(MessageError::InvalidParameters(
                "message id must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MessageId {
    type Error = MessageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// A message about to be appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Caller-chosen ID; appending the same ID twice is idempotent
    pub id: MessageId,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Author
    pub sender: Identity,
    /// Non-blank user content
    pub text: String,
    /// Requested timestamp; the backend raises it to the log tail if it is older
    pub sent_at: Timestamp,
}

impl NewMessage {
    /// Check the content rules shared by every backend
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.text.trim().is_empty() {
            return Err(MessageError::InvalidParameters(
                "message text must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored, immutable message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Author
    pub sender: Identity,
    /// User content
    pub text: String,
    /// Effective timestamp, never older than any earlier entry in the log
    pub sent_at: Timestamp,
    /// Insertion sequence assigned by the backend, strictly increasing per conversation
    pub seq: u64,
}

impl Message {
    /// Position in log order: `sent_at`, then insertion sequence
    pub fn ordering_key(&self) -> (Timestamp, u64) {
        (self.sent_at, self.seq)
    }
}
