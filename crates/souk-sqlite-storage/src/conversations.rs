//! Implementation of ConversationStorage trait for SQLite storage.

use rusqlite::{Connection, OptionalExtension, params};
use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::conversations::error::ConversationError;
use souk_storage_traits::conversations::types::{Conversation, LastMessage};
use souk_storage_traits::{ConversationId, Identity, ParticipantPair, StorageChange, Timestamp};

use crate::error::into_conversation_err;
use crate::{SoukSqliteStorage, db};

/// Load a record that the caller requires to exist
fn require_conversation(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> Result<Conversation, ConversationError> {
    db::load_conversation(conn, conversation_id)
        .map_err(into_conversation_err)?
        .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))
}

/// Revision of an existing conversation, `NotFound` if there is none
fn current_revision(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> Result<u64, ConversationError> {
    conn.query_row(
        "SELECT revision FROM conversations WHERE id = ?",
        [conversation_id.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(into_conversation_err)?
    .ok_or_else(|| ConversationError::NotFound(conversation_id.clone()))
}

/// Insert the record if absent, or backfill the participants of a record left
/// without them. Returns the record and whether anything was written.
fn ensure_in_transaction(
    conn: &Connection,
    participants: &ParticipantPair,
) -> Result<(Conversation, bool), ConversationError> {
    let conversation_id = participants.conversation_id();
    let tx = conn.unchecked_transaction().map_err(into_conversation_err)?;

    let inserted = tx
        .execute(
            "INSERT OR IGNORE INTO conversations \
             (id, participant_a, participant_b, revision, created_at) \
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![
                conversation_id.as_str(),
                participants.first().as_str(),
                participants.second().as_str(),
                Timestamp::now().as_millis(),
            ],
        )
        .map_err(into_conversation_err)?;

    let mut changed = inserted > 0;
    if !changed {
        let repaired = tx
            .execute(
                "UPDATE conversations SET participant_a = ?2, participant_b = ?3, \
                 revision = revision + 1 \
                 WHERE id = ?1 AND participant_a IS NULL AND participant_b IS NULL",
                params![
                    conversation_id.as_str(),
                    participants.first().as_str(),
                    participants.second().as_str(),
                ],
            )
            .map_err(into_conversation_err)?;
        if repaired > 0 {
            tracing::warn!(
                conversation_id = %conversation_id,
                "Backfilling missing participants on existing conversation"
            );
            changed = true;
        }
    }

    if changed {
        for identity in participants.iter() {
            tx.execute(
                "INSERT OR IGNORE INTO unread_counts (conversation_id, identity, count) \
                 VALUES (?1, ?2, 0)",
                params![conversation_id.as_str(), identity.as_str()],
            )
            .map_err(into_conversation_err)?;
        }
    }

    let conversation = require_conversation(&tx, &conversation_id)?;
    tx.commit().map_err(into_conversation_err)?;
    Ok((conversation, changed))
}

fn apply_effect_in_transaction(
    conn: &Connection,
    conversation_id: &ConversationId,
    sender: &Identity,
    summary: LastMessage,
) -> Result<Conversation, ConversationError> {
    let tx = conn.unchecked_transaction().map_err(into_conversation_err)?;
    let mut conversation = require_conversation(&tx, conversation_id)?;

    // Validate everything before writing so a failure leaves the row intact
    let receiver = conversation.counterpart_of(sender)?;

    if conversation.update_last_message_if_newer(summary) {
        db::write_last_message(&tx, conversation_id, conversation.last_message.as_ref())
            .map_err(into_conversation_err)?;
    }
    db::increment_unread_row(&tx, conversation_id, &receiver).map_err(into_conversation_err)?;
    db::bump_revision(&tx, conversation_id).map_err(into_conversation_err)?;

    let conversation = require_conversation(&tx, conversation_id)?;
    tx.commit().map_err(into_conversation_err)?;
    Ok(conversation)
}

/// Returns the new count and revision
fn increment_in_transaction(
    conn: &Connection,
    conversation_id: &ConversationId,
    identity: &Identity,
) -> Result<(u32, u64), ConversationError> {
    let tx = conn.unchecked_transaction().map_err(into_conversation_err)?;
    let revision = current_revision(&tx, conversation_id)?;

    let count =
        db::increment_unread_row(&tx, conversation_id, identity).map_err(into_conversation_err)?;
    db::bump_revision(&tx, conversation_id).map_err(into_conversation_err)?;

    tx.commit().map_err(into_conversation_err)?;
    Ok((count, revision + 1))
}

/// Returns the new revision, or `None` if the counter was already zero
fn reset_in_transaction(
    conn: &Connection,
    conversation_id: &ConversationId,
    identity: &Identity,
) -> Result<Option<u64>, ConversationError> {
    let tx = conn.unchecked_transaction().map_err(into_conversation_err)?;
    let revision = current_revision(&tx, conversation_id)?;

    let changed = tx
        .execute(
            "UPDATE unread_counts SET count = 0 \
             WHERE conversation_id = ?1 AND identity = ?2 AND count != 0",
            params![conversation_id.as_str(), identity.as_str()],
        )
        .map_err(into_conversation_err)?;
    if changed == 0 {
        return Ok(None);
    }

    db::bump_revision(&tx, conversation_id).map_err(into_conversation_err)?;
    tx.commit().map_err(into_conversation_err)?;
    Ok(Some(revision + 1))
}

fn set_last_message_in_transaction(
    conn: &Connection,
    conversation_id: &ConversationId,
    summary: Option<&LastMessage>,
) -> Result<Conversation, ConversationError> {
    let tx = conn.unchecked_transaction().map_err(into_conversation_err)?;
    current_revision(&tx, conversation_id)?;

    db::write_last_message(&tx, conversation_id, summary).map_err(into_conversation_err)?;
    db::bump_revision(&tx, conversation_id).map_err(into_conversation_err)?;

    let conversation = require_conversation(&tx, conversation_id)?;
    tx.commit().map_err(into_conversation_err)?;
    Ok(conversation)
}

impl SoukSqliteStorage {
    fn publish_conversation(&self, conversation_id: &ConversationId, revision: u64) {
        self.publish(StorageChange::ConversationChanged {
            conversation_id: conversation_id.clone(),
            revision,
        });
    }
}

impl ConversationStorage for SoukSqliteStorage {
    fn ensure_conversation(
        &self,
        participants: &ParticipantPair,
    ) -> Result<Conversation, ConversationError> {
        let (conversation, changed) =
            self.with_connection(|conn| ensure_in_transaction(conn, participants))?;

        if changed {
            self.publish_conversation(&conversation.id, conversation.revision);
        }
        Ok(conversation)
    }

    fn find_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, ConversationError> {
        self.with_connection(|conn| {
            db::load_conversation(conn, conversation_id).map_err(into_conversation_err)
        })
    }

    fn conversations_for_participant(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Conversation>, ConversationError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM conversations WHERE participant_a = ?1 OR participant_b = ?1",
                    db::CONVERSATION_COLUMNS
                ))
                .map_err(into_conversation_err)?;

            let rows = stmt
                .query_map([identity.as_str()], db::row_to_conversation)
                .map_err(into_conversation_err)?;

            let mut conversations: Vec<Conversation> = Vec::new();
            for row in rows {
                match row {
                    Ok(mut conversation) => {
                        conversation.unread_counts = db::load_unread_counts(conn, &conversation.id)
                            .map_err(into_conversation_err)?;
                        conversations.push(conversation);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Failed to deserialize conversation row, skipping"
                        );
                    }
                }
            }

            Ok(conversations)
        })
    }

    fn apply_message_effect(
        &self,
        conversation_id: &ConversationId,
        sender: &Identity,
        summary: LastMessage,
    ) -> Result<Conversation, ConversationError> {
        let conversation = self.with_connection(|conn| {
            apply_effect_in_transaction(conn, conversation_id, sender, summary)
        })?;

        self.publish_conversation(&conversation.id, conversation.revision);
        Ok(conversation)
    }

    fn increment_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<u32, ConversationError> {
        let (count, revision) = self
            .with_connection(|conn| increment_in_transaction(conn, conversation_id, identity))?;

        self.publish_conversation(conversation_id, revision);
        Ok(count)
    }

    fn reset_unread(
        &self,
        conversation_id: &ConversationId,
        identity: &Identity,
    ) -> Result<bool, ConversationError> {
        let revision =
            self.with_connection(|conn| reset_in_transaction(conn, conversation_id, identity))?;

        match revision {
            Some(revision) => {
                self.publish_conversation(conversation_id, revision);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_last_message(
        &self,
        conversation_id: &ConversationId,
        summary: Option<LastMessage>,
    ) -> Result<Conversation, ConversationError> {
        let conversation = self.with_connection(|conn| {
            set_last_message_in_transaction(conn, conversation_id, summary.as_ref())
        })?;

        self.publish_conversation(&conversation.id, conversation.revision);
        Ok(conversation)
    }
}
