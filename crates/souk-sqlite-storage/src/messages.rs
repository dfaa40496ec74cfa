//! Implementation of MessageStorage trait for SQLite storage.

use rusqlite::{Connection, OptionalExtension, params};
use souk_storage_traits::messages::error::MessageError;
use souk_storage_traits::messages::types::{Message, MessageId, NewMessage};
use souk_storage_traits::messages::{MessageSortOrder, MessageStorage, Pagination};
use souk_storage_traits::{ConversationId, StorageChange, Timestamp};

use crate::error::into_message_err;
use crate::validation::{MAX_MESSAGE_TEXT_LENGTH, validate_string_length};
use crate::{SoukSqliteStorage, db};

fn require_conversation_exists(
    conn: &Connection,
    conversation_id: &ConversationId,
) -> Result<(), MessageError> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?)",
            [conversation_id.as_str()],
            |row| row.get(0),
        )
        .map_err(into_message_err)?;
    if !exists {
        return Err(MessageError::ConversationNotFound(conversation_id.clone()));
    }
    Ok(())
}

fn find_in(
    conn: &Connection,
    conversation_id: &ConversationId,
    message_id: &MessageId,
) -> Result<Option<Message>, MessageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 AND id = ?2",
            db::MESSAGE_COLUMNS
        ))
        .map_err(into_message_err)?;

    stmt.query_row(
        params![conversation_id.as_str(), message_id.as_str()],
        db::row_to_message,
    )
    .optional()
    .map_err(into_message_err)
}

/// Returns the stored message and whether this call inserted it
fn append_in_transaction(
    conn: &Connection,
    message: NewMessage,
) -> Result<(Message, bool), MessageError> {
    let tx = conn.unchecked_transaction().map_err(into_message_err)?;
    require_conversation_exists(&tx, &message.conversation_id)?;

    // Retried append of a message that already landed
    if let Some(existing) = find_in(&tx, &message.conversation_id, &message.id)? {
        return Ok((existing, false));
    }

    let (seq, tail_sent_at): (u64, Option<u64>) = tx
        .query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1, MAX(sent_at) FROM messages WHERE conversation_id = ?",
            [message.conversation_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(into_message_err)?;
    // Late commits land at the tail, never in the middle
    let sent_at = match tail_sent_at {
        Some(tail) => message.sent_at.max(Timestamp::from_millis(tail)),
        None => message.sent_at,
    };

    tx.execute(
        "INSERT INTO messages (conversation_id, id, seq, sender, text, sent_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.conversation_id.as_str(),
            message.id.as_str(),
            seq,
            message.sender.as_str(),
            &message.text,
            sent_at.as_millis(),
        ],
    )
    .map_err(into_message_err)?;
    tx.commit().map_err(into_message_err)?;

    Ok((
        Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: message.sender,
            text: message.text,
            sent_at,
            seq,
        },
        true,
    ))
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>, MessageError> {
    let mut stmt = conn.prepare(sql).map_err(into_message_err)?;
    let rows = stmt
        .query_map(params, db::row_to_message)
        .map_err(into_message_err)?;

    let mut messages: Vec<Message> = Vec::new();
    for row in rows {
        messages.push(row.map_err(into_message_err)?);
    }
    Ok(messages)
}

impl MessageStorage for SoukSqliteStorage {
    fn append_message(&self, message: NewMessage) -> Result<Message, MessageError> {
        message.validate()?;
        validate_string_length(&message.text, MAX_MESSAGE_TEXT_LENGTH, "Message text")
            .map_err(|e| MessageError::InvalidParameters(e.to_string()))?;

        let (stored, inserted) = self.with_connection(|conn| append_in_transaction(conn, message))?;

        if inserted {
            self.publish(StorageChange::MessageAppended {
                conversation_id: stored.conversation_id.clone(),
                message_id: stored.id.clone(),
                seq: stored.seq,
            });
        }
        Ok(stored)
    }

    fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<Message>, MessageError> {
        self.with_connection(|conn| find_in(conn, conversation_id, message_id))
    }

    fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MessageError> {
        self.with_connection(|conn| {
            require_conversation_exists(conn, conversation_id)?;
            query_messages(
                conn,
                &format!(
                    "SELECT {} FROM messages WHERE conversation_id = ? ORDER BY sent_at ASC, seq ASC",
                    db::MESSAGE_COLUMNS
                ),
                [conversation_id.as_str()],
            )
        })
    }

    fn messages_page(
        &self,
        conversation_id: &ConversationId,
        pagination: Pagination,
    ) -> Result<Vec<Message>, MessageError> {
        pagination.validate()?;

        let order_by = match pagination.sort_order() {
            MessageSortOrder::Ascending => "sent_at ASC, seq ASC",
            MessageSortOrder::Descending => "sent_at DESC, seq DESC",
        };

        self.with_connection(|conn| {
            require_conversation_exists(conn, conversation_id)?;
            query_messages(
                conn,
                &format!(
                    "SELECT {} FROM messages WHERE conversation_id = ?1 \
                     ORDER BY {order_by} LIMIT ?2 OFFSET ?3",
                    db::MESSAGE_COLUMNS
                ),
                params![
                    conversation_id.as_str(),
                    pagination.limit() as i64,
                    pagination.offset() as i64
                ],
            )
        })
    }

    fn last_message(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Message>, MessageError> {
        self.with_connection(|conn| {
            require_conversation_exists(conn, conversation_id)?;
            let mut messages = query_messages(
                conn,
                &format!(
                    "SELECT {} FROM messages WHERE conversation_id = ? \
                     ORDER BY sent_at DESC, seq DESC LIMIT 1",
                    db::MESSAGE_COLUMNS
                ),
                [conversation_id.as_str()],
            )?;
            Ok(messages.pop())
        })
    }
}
