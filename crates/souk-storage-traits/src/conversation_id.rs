//! Conversation key resolution
//!
//! A conversation between two identities is addressed by a key derived from the pair
//! alone, so two sessions computing it independently always agree and a pair can never
//! end up with two conversations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Identity;
use crate::conversations::error::ConversationError;

/// Separator placed between the two identities of a [`ConversationId`]
pub const CONVERSATION_ID_SEPARATOR: char = '_';

/// Two distinct identities in canonical (lexicographic) order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    first: Identity,
    second: Identity,
}

impl ParticipantPair {
    /// Build a pair from two identities given in any order.
    ///
    /// Returns [`ConversationError::InvalidParameters`] if both are the same identity.
    pub fn new(a: Identity, b: Identity) -> Result<Self, ConversationError> {
        if a == b {
            return Err(ConversationError::InvalidParameters(format!(
                "a conversation needs two distinct identities, got {a} twice"
            )));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    /// The lexicographically smaller identity
    pub fn first(&self) -> &Identity {
        &self.first
    }

    /// The lexicographically larger identity
    pub fn second(&self) -> &Identity {
        &self.second
    }

    /// Check whether `identity` is one of the two participants
    pub fn contains(&self, identity: &Identity) -> bool {
        &self.first == identity || &self.second == identity
    }

    /// The participant that is not `identity`, or `None` if `identity` is not in the pair
    pub fn counterpart_of(&self, identity: &Identity) -> Option<&Identity> {
        if &self.first == identity {
            Some(&self.second)
        } else if &self.second == identity {
            Some(&self.first)
        } else {
            None
        }
    }

    /// Iterate both participants in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        [&self.first, &self.second].into_iter()
    }

    /// Both participants as a vector, in canonical order
    pub fn to_vec(&self) -> Vec<Identity> {
        vec![self.first.clone(), self.second.clone()]
    }

    /// The conversation key for this pair
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId(format!(
            "{}{}{}",
            self.first, CONVERSATION_ID_SEPARATOR, self.second
        ))
    }
}

/// Order-independent conversation key: both identities sorted and joined by
/// [`CONVERSATION_ID_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Derive the key for a conversation between `a` and `b`.
    ///
    /// `resolve(a, b) == resolve(b, a)` for every pair. Passing the same identity twice
    /// is a caller error.
    pub fn resolve(a: &Identity, b: &Identity) -> Result<Self, ConversationError> {
        ParticipantPair::new(a.clone(), b.clone()).map(|pair| pair.conversation_id())
    }

    /// Split the key back into its participant pair
    pub fn participants(&self) -> Result<ParticipantPair, ConversationError> {
        let Some((first, second)) = self.0.split_once(CONVERSATION_ID_SEPARATOR) else {
            return Err(ConversationError::InvalidParameters(format!(
                "malformed conversation id: {}",
                self.0
            )));
        };
        let pair = ParticipantPair::new(Identity::new(first)?, Identity::new(second)?)?;
        if pair.first().as_str() != first {
            return Err(ConversationError::InvalidParameters(format!(
                "conversation id is not in canonical order: {}",
                self.0
            )));
        }
        Ok(pair)
    }

    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConversationId {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_string());
        id.participants()?;
        Ok(id)
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ConversationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_resolve_is_order_independent() {
        let pairs = [("u1", "u2"), ("zed", "amy"), ("B", "a"), ("42", "7")];
        for (a, b) in pairs {
            let ab = ConversationId::resolve(&identity(a), &identity(b)).unwrap();
            let ba = ConversationId::resolve(&identity(b), &identity(a)).unwrap();
            assert_eq!(ab, ba);
        }
    }

    #[test]
    fn test_resolve_is_lexicographic_join() {
        let id = ConversationId::resolve(&identity("u2"), &identity("u1")).unwrap();
        assert_eq!(id.as_str(), "u1_u2");
    }

    #[test]
    fn test_resolve_rejects_same_identity() {
        let err = ConversationId::resolve(&identity("u1"), &identity("u1")).unwrap_err();
        assert!(matches!(err, ConversationError::InvalidParameters(_)));
    }

    #[test]
    fn test_participants_round_trip() {
        let id = ConversationId::resolve(&identity("seller"), &identity("buyer")).unwrap();
        let pair = id.participants().unwrap();
        assert_eq!(pair.first().as_str(), "buyer");
        assert_eq!(pair.second().as_str(), "seller");
        assert_eq!(pair.conversation_id(), id);
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!("u1".parse::<ConversationId>().is_err());
        assert!("u1_u1".parse::<ConversationId>().is_err());
        assert!("u2_u1".parse::<ConversationId>().is_err());
        assert!("_u1".parse::<ConversationId>().is_err());
        assert!("u1_u2".parse::<ConversationId>().is_ok());
    }

    #[test]
    fn test_counterpart_of() {
        let pair = ParticipantPair::new(identity("u2"), identity("u1")).unwrap();
        assert_eq!(pair.counterpart_of(&identity("u1")), Some(&identity("u2")));
        assert_eq!(pair.counterpart_of(&identity("u2")), Some(&identity("u1")));
        assert_eq!(pair.counterpart_of(&identity("u3")), None);
    }
}
