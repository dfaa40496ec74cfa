//! Types for the conversations module

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::messages::types::{Message, MessageId};
use crate::{ConversationId, Identity, ParticipantPair, Timestamp};

use super::error::ConversationError;

/// Denormalized summary of the newest message in a conversation's log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LastMessage {
    /// ID of the summarized message
    pub message_id: MessageId,
    /// Message text
    pub text: String,
    /// Author of the message
    pub sender: Identity,
    /// Ordering timestamp of the message
    pub sent_at: Timestamp,
    /// Backend-assigned insertion sequence, breaks `sent_at` ties
    pub seq: u64,
}

impl LastMessage {
    /// Summarize a stored message
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            text: message.text.clone(),
            sender: message.sender.clone(),
            sent_at: message.sent_at,
            seq: message.seq,
        }
    }

    /// Position of the summarized message in log order
    pub fn ordering_key(&self) -> (Timestamp, u64) {
        (self.sent_at, self.seq)
    }
}

/// Per-participant unread counters.
///
/// A missing entry reads as zero; it is never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadCounts(BTreeMap<Identity, u32>);

impl UnreadCounts {
    /// Empty counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed counters for both participants of `pair`
    pub fn zeroed(pair: &ParticipantPair) -> Self {
        Self(pair.iter().map(|identity| (identity.clone(), 0)).collect())
    }

    /// Counter for `identity`, zero if absent
    pub fn get(&self, identity: &Identity) -> u32 {
        self.0.get(identity).copied().unwrap_or(0)
    }

    /// Add one to `identity`'s counter and return the new value
    pub fn increment(&mut self, identity: &Identity) -> u32 {
        let count = self.0.entry(identity.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Set `identity`'s counter to zero. Returns `true` if the value changed.
    pub fn reset(&mut self, identity: &Identity) -> bool {
        match self.0.get_mut(identity) {
            Some(count) if *count > 0 => {
                *count = 0;
                true
            }
            _ => false,
        }
    }

    /// Set a counter directly (used when loading from a backend)
    pub fn set(&mut self, identity: Identity, count: u32) {
        self.0.insert(identity, count);
    }

    /// Make sure `identity` has an explicit entry, inserting zero if absent
    pub fn ensure_entry(&mut self, identity: &Identity) {
        self.0.entry(identity.clone()).or_insert(0);
    }

    /// Iterate `(identity, count)` entries
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, u32)> {
        self.0.iter().map(|(identity, count)| (identity, *count))
    }

    /// Whether there are no explicit entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A two-party conversation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Key derived from the participant pair
    pub id: ConversationId,
    /// Participants as stored. Exactly two distinct identities for a well-formed
    /// record; use [`Conversation::participant_pair`] to read them checked.
    pub participants: Vec<Identity>,
    /// Unread counter per participant
    pub unread_counts: UnreadCounts,
    /// Summary of the newest message, absent until the first send
    pub last_message: Option<LastMessage>,
    /// Incremented on every effective write; subscribers use it to discard stale
    /// snapshots
    pub revision: u64,
    /// When the record was created
    pub created_at: Timestamp,
}

impl Conversation {
    /// Fresh record for `pair`: zeroed counters, no last message, revision 1
    pub fn new(pair: &ParticipantPair, created_at: Timestamp) -> Self {
        Self {
            id: pair.conversation_id(),
            participants: pair.to_vec(),
            unread_counts: UnreadCounts::zeroed(pair),
            last_message: None,
            revision: 1,
            created_at,
        }
    }

    /// The participants, checked against the data-model invariant.
    ///
    /// Returns [`ConversationError::Integrity`] unless the record holds exactly two
    /// distinct identities matching its key.
    pub fn participant_pair(&self) -> Result<ParticipantPair, ConversationError> {
        let [a, b] = self.participants.as_slice() else {
            return Err(ConversationError::Integrity(format!(
                "conversation {} has {} participants, expected 2",
                self.id,
                self.participants.len()
            )));
        };
        let pair = ParticipantPair::new(a.clone(), b.clone()).map_err(|_| {
            ConversationError::Integrity(format!(
                "conversation {} lists {a} twice as participant",
                self.id
            ))
        })?;
        if pair.conversation_id() != self.id {
            return Err(ConversationError::Integrity(format!(
                "conversation {} lists participants of {}",
                self.id,
                pair.conversation_id()
            )));
        }
        Ok(pair)
    }

    /// Whether the participants list is missing (left by a partial write)
    pub fn is_missing_participants(&self) -> bool {
        self.participants.is_empty()
    }

    /// Whether `identity` is listed as a participant
    pub fn is_participant(&self, identity: &Identity) -> bool {
        self.participants.contains(identity)
    }

    /// The other participant from `identity`'s point of view
    pub fn counterpart_of(&self, identity: &Identity) -> Result<Identity, ConversationError> {
        let pair = self.participant_pair()?;
        pair.counterpart_of(identity)
            .cloned()
            .ok_or_else(|| ConversationError::NotParticipant {
                conversation_id: self.id.clone(),
                identity: identity.clone(),
            })
    }

    /// Unread count for `identity`, zero if the entry is missing
    pub fn unread_for(&self, identity: &Identity) -> u32 {
        self.unread_counts.get(identity)
    }

    /// Replaces the last-message summary if `summary` orders at or after the current
    /// one by `(sent_at, seq)`.
    ///
    /// Returns `true` if the summary was replaced.
    pub fn update_last_message_if_newer(&mut self, summary: LastMessage) -> bool {
        let newer = match &self.last_message {
            Some(current) => summary.ordering_key() >= current.ordering_key(),
            None => true,
        };
        if newer {
            self.last_message = Some(summary);
        }
        newer
    }

    /// Mark an effective write
    pub fn bump_revision(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }
}
