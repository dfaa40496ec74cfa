//! Conversations module
//!
//! This module is responsible for storing and retrieving conversation records: the
//! participant pair, the last-message summary and the per-participant unread counters.
//!
//! Every mutation is expressed as a commutative operation (delta increment,
//! unconditional reset, ordered last-write-wins summary replace) so that uncoordinated
//! writers from both participants' sessions cannot corrupt a record.

use crate::{ConversationId, Identity, ParticipantPair};

pub mod error;
pub mod types;

use self::error::ConversationError;
use self::types::*;

/// Storage traits for the conversations module
pub trait ConversationStorage {
    /// Create the conversation for `participants` if it does not exist yet.
    ///
    /// A new record starts with both unread counters at zero and no last message. An
    /// existing record is returned unchanged, except that an empty `participants` list
    /// left by an earlier partial write is backfilled from the pair. Concurrent calls
    /// for the same pair converge to one stored record.
    fn ensure_conversation(
        &self,
        participants: &ParticipantPair,
    ) -> Result<Conversation, ConversationError>;

    /// Find a conversation by ID
    fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationError>;

    /// All conversations `identity` participates in, in no particular order
    fn conversations_for_participant(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Conversation>, ConversationError>;

    /// Record the effect of a sent message as one atomic unit.
    ///
    /// Replaces the last-message summary if `summary` orders at or after the current
    /// one and increments the unread counter of the participant that is not `sender`
    /// by exactly one. Either both effects are applied or neither is.
    ///
    /// Returns [`ConversationError::NotParticipant`] if `sender` is not in the pair and
    /// [`ConversationError::Integrity`] if the record does not hold exactly two
    /// participants.
    fn apply_message_effect(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        summary: LastMessage,
    ) -> Result<Conversation, ConversationError>;

    /// Atomically add one to `identity`'s unread counter, returning the new value.
    ///
    /// A missing counter entry counts as zero.
    fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32, ConversationError>;

    /// Set `identity`'s unread counter to zero.
    ///
    /// Returns `true` if the stored value changed. Resetting a zero (or missing)
    /// counter is a no-op that leaves the revision untouched.
    fn reset_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool, ConversationError>;

    /// Overwrite the last-message summary.
    ///
    /// Used when rebuilding the summary from the message log; regular sends go
    /// through [`ConversationStorage::apply_message_effect`].
    fn set_last_message(
        &self,
        conversation_id: &ConversationId,
        summary: Option<LastMessage>,
    ) -> Result<Conversation, ConversationError>;
}
