//! Opaque user identity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CONVERSATION_ID_SEPARATOR;
use crate::conversations::error::ConversationError;

/// An authenticated user reference.
///
/// No internal structure is assumed beyond three rules: it is non-empty, it carries no
/// surrounding whitespace, and it does not contain [`CONVERSATION_ID_SEPARATOR`] (so a
/// joined conversation key can always be split back into its two identities).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a new identity, validating its shape
    pub fn new<S>(value: S) -> Result<Self, ConversationError>
    where
        S: Into<String>,
    {
        let value: String = value.into();
        if value.is_empty() {
            return Err(ConversationError::InvalidParameters(
                "identity must not be empty".to_string(),
            ));
        }
        if value.trim() != value {
            return Err(ConversationError::InvalidParameters(format!(
                "identity must not have surrounding whitespace: {value:?}"
            )));
        }
        if value.contains(CONVERSATION_ID_SEPARATOR) {
            return Err(ConversationError::InvalidParameters(format!(
                "identity must not contain '{CONVERSATION_ID_SEPARATOR}': {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identity and return the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = ConversationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
