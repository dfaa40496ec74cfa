use std::cmp::Ordering;

use souk_storage_traits::conversations::types::Conversation;
use souk_storage_traits::{ConversationId, Identity, Timestamp};

/// One row of an identity's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub conversation_id: ConversationId,
    pub counterpart: Identity,
    pub last_message_text: Option<String>,
    pub last_message_time: Option<Timestamp>,
    pub unread_count: u32,
}

/// Builds `identity`'s inbox rows from raw records.
///
/// Unread conversations come first, then the most recent message; conversations
/// without messages sink to the bottom. Records that do not hold exactly two distinct
/// participants are reported and left out.
pub fn project_inbox(identity: &Identity, conversations: &[Conversation]) -> Vec<InboxEntry> {
    let mut entries: Vec<InboxEntry> = conversations
        .iter()
        .filter_map(|conversation| match conversation.counterpart_of(identity) {
            Ok(counterpart) => Some(InboxEntry {
                conversation_id: conversation.id.clone(),
                counterpart,
                last_message_text: conversation.last_message.as_ref().map(|m| m.text.clone()),
                last_message_time: conversation.last_message.as_ref().map(|m| m.sent_at),
                unread_count: conversation.unread_for(identity),
            }),
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    identity = %identity,
                    error = %e,
                    "skipping conversation in inbox"
                );
                None
            }
        })
        .collect();
    entries.sort_by(inbox_order);
    entries
}

fn inbox_order(a: &InboxEntry, b: &InboxEntry) -> Ordering {
    let a_unread = a.unread_count > 0;
    let b_unread = b.unread_count > 0;
    b_unread
        .cmp(&a_unread)
        .then_with(|| match (a.last_message_time, b.last_message_time) {
            (Some(a_time), Some(b_time)) => b_time.cmp(&a_time),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.conversation_id.cmp(&b.conversation_id))
}
