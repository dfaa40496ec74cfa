//! Database utilities for SQLite storage.

use std::io::{Error as IoError, ErrorKind};

use rusqlite::types::Type;
use rusqlite::{Connection, Error, OptionalExtension, Result as SqliteResult, Row, params};
use souk_storage_traits::conversations::types::{Conversation, LastMessage, UnreadCounts};
use souk_storage_traits::messages::types::{Message, MessageId};
use souk_storage_traits::{ConversationId, Identity, Timestamp};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, \
     last_message_id, last_message_text, last_message_sender, last_message_sent_at, \
     last_message_seq, revision, created_at";

pub(crate) const MESSAGE_COLUMNS: &str = "conversation_id, id, seq, sender, text, sent_at";

#[inline]
fn map_to_text_boxed_error<T>(e: T) -> Error
where
    T: std::error::Error + Send + Sync + 'static,
{
    Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
}

#[inline]
fn map_invalid_text_data(msg: &str) -> Error {
    Error::FromSqlConversionFailure(
        0,
        Type::Text,
        Box::new(IoError::new(ErrorKind::InvalidData, msg)),
    )
}

fn parse_identity(value: String) -> SqliteResult<Identity> {
    Identity::new(value).map_err(map_to_text_boxed_error)
}

/// Convert a row to a Conversation with empty unread counts.
///
/// Counters live in their own table; see [`load_unread_counts`].
pub fn row_to_conversation(row: &Row) -> SqliteResult<Conversation> {
    let id: String = row.get("id")?;
    let id: ConversationId = id.parse().map_err(map_to_text_boxed_error)?;

    let mut participants: Vec<Identity> = Vec::with_capacity(2);
    for column in ["participant_a", "participant_b"] {
        if let Some(value) = row.get::<_, Option<String>>(column)? {
            participants.push(parse_identity(value)?);
        }
    }

    let last_message_id: Option<String> = row.get("last_message_id")?;
    let last_message = match last_message_id {
        Some(message_id) => {
            let text: Option<String> = row.get("last_message_text")?;
            let sender: Option<String> = row.get("last_message_sender")?;
            let sent_at: Option<u64> = row.get("last_message_sent_at")?;
            let seq: Option<u64> = row.get("last_message_seq")?;
            let (Some(text), Some(sender), Some(sent_at), Some(seq)) = (text, sender, sent_at, seq)
            else {
                return Err(map_invalid_text_data("Incomplete last message summary"));
            };
            Some(LastMessage {
                message_id: MessageId::new(message_id).map_err(map_to_text_boxed_error)?,
                text,
                sender: parse_identity(sender)?,
                sent_at: Timestamp::from_millis(sent_at),
                seq,
            })
        }
        None => None,
    };

    let revision: u64 = row.get("revision")?;
    let created_at: u64 = row.get("created_at")?;

    Ok(Conversation {
        id,
        participants,
        unread_counts: UnreadCounts::new(),
        last_message,
        revision,
        created_at: Timestamp::from_millis(created_at),
    })
}

/// Convert a row to a Message struct
pub fn row_to_message(row: &Row) -> SqliteResult<Message> {
    let conversation_id: String = row.get("conversation_id")?;
    let id: String = row.get("id")?;
    let seq: u64 = row.get("seq")?;
    let sender: String = row.get("sender")?;
    let text: String = row.get("text")?;
    let sent_at: u64 = row.get("sent_at")?;

    Ok(Message {
        id: MessageId::new(id).map_err(map_to_text_boxed_error)?,
        conversation_id: conversation_id.parse().map_err(map_to_text_boxed_error)?,
        sender: parse_identity(sender)?,
        text,
        sent_at: Timestamp::from_millis(sent_at),
        seq,
    })
}

/// Read the unread counter rows of one conversation
pub fn load_unread_counts(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> SqliteResult<UnreadCounts> {
    let mut stmt = conn.prepare_cached(
        "SELECT identity, count FROM unread_counts WHERE conversation_id = ?",
    )?;
    let rows = stmt.query_map([conversation_id.as_str()], |row| {
        let identity: String = row.get(0)?;
        let count: u32 = row.get(1)?;
        Ok((identity, count))
    })?;

    let mut counts = UnreadCounts::new();
    for row in rows {
        let (identity, count) = row?;
        counts.set(parse_identity(identity)?, count);
    }
    Ok(counts)
}

/// Load a full conversation record, counters included
pub fn load_conversation(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> SqliteResult<Option<Conversation>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
    ))?;
    let conversation = stmt
        .query_row([conversation_id.as_str()], row_to_conversation)
        .optional()?;

    match conversation {
        Some(mut conversation) => {
            conversation.unread_counts = load_unread_counts(conn, conversation_id)?;
            Ok(Some(conversation))
        }
        None => Ok(None),
    }
}

/// Persist the last-message summary columns of a conversation
pub fn write_last_message(
    conn: &Connection,
    conversation_id: &ConversationId,
    summary: Option<&LastMessage>,
) -> SqliteResult<()> {
    conn.execute(
        "UPDATE conversations SET last_message_id = ?2, last_message_text = ?3, \
         last_message_sender = ?4, last_message_sent_at = ?5, last_message_seq = ?6 \
         WHERE id = ?1",
        params![
            conversation_id.as_str(),
            summary.map(|s| s.message_id.as_str()),
            summary.map(|s| s.text.as_str()),
            summary.map(|s| s.sender.as_str()),
            summary.map(|s| s.sent_at.as_millis()),
            summary.map(|s| s.seq),
        ],
    )?;
    Ok(())
}

/// Add one to an unread counter, creating the row if it is missing
pub fn increment_unread_row(
    conn: &Connection,
    conversation_id: &ConversationId,
    identity: &Identity,
) -> SqliteResult<u32> {
    conn.execute(
        "INSERT INTO unread_counts (conversation_id, identity, count) VALUES (?1, ?2, 1) \
         ON CONFLICT(conversation_id, identity) DO UPDATE SET count = count + 1",
        params![conversation_id.as_str(), identity.as_str()],
    )?;
    conn.query_row(
        "SELECT count FROM unread_counts WHERE conversation_id = ?1 AND identity = ?2",
        params![conversation_id.as_str(), identity.as_str()],
        |row| row.get(0),
    )
}

/// Increment the revision of a conversation
pub fn bump_revision(conn: &Connection, conversation_id: &ConversationId) -> SqliteResult<()> {
    conn.execute(
        "UPDATE conversations SET revision = revision + 1 WHERE id = ?",
        [conversation_id.as_str()],
    )?;
    Ok(())
}
