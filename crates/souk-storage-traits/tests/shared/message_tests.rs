//! Message storage test functions

use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::messages::error::MessageError;
use souk_storage_traits::messages::types::MessageId;
use souk_storage_traits::messages::{MessageSortOrder, MessageStorage, Pagination};

use souk_storage_traits::test_utils::{new_message, pair};

/// Appended messages come back in commit order with non-decreasing timestamps
pub fn test_append_and_order_messages<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let id = &conversation.id;

    let first = storage
        .append_message(new_message(id, "m1", "u1", "first", 100))
        .unwrap();
    let tie = storage
        .append_message(new_message(id, "m2", "u2", "tie", 100))
        .unwrap();
    let last = storage
        .append_message(new_message(id, "m3", "u1", "last", 300))
        .unwrap();

    assert!(first.seq < tie.seq && tie.seq < last.seq);
    assert_eq!(last.sent_at.as_millis(), 300);

    let texts: Vec<String> = storage
        .messages(id)
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["first", "tie", "last"]);
    assert_eq!(storage.last_message(id).unwrap().unwrap().id, last.id);
}

/// A message stamped before the tail but committed after it lands at the tail
pub fn test_late_commit_lands_at_tail<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let id = &conversation.id;

    storage
        .append_message(new_message(id, "m1", "u1", "committed first", 200))
        .unwrap();
    let before = storage.messages(id).unwrap();

    let late = storage
        .append_message(new_message(id, "m2", "u2", "stamped first", 100))
        .unwrap();
    assert_eq!(late.sent_at.as_millis(), 200);

    let after = storage.messages(id).unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(&after[..1], &before[..]);
    assert_eq!(after[1].id, late.id);
    assert_eq!(storage.last_message(id).unwrap().unwrap().id, late.id);

    let descending = storage
        .messages_page(
            id,
            Pagination::with_sort_order(Some(1), None, MessageSortOrder::Descending),
        )
        .unwrap();
    assert_eq!(descending[0].id, late.id);
}

/// Blank text never reaches the log
pub fn test_append_rejects_blank_text<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let err = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "   ", 100))
        .unwrap_err();
    assert!(matches!(err, MessageError::InvalidParameters(_)));
    assert!(storage.messages(&conversation.id).unwrap().is_empty());
}

/// A log needs its conversation
pub fn test_append_requires_conversation<S>(storage: S)
where
    S: MessageStorage,
{
    let id = pair("u1", "u2").conversation_id();
    let err = storage
        .append_message(new_message(&id, "m1", "u1", "hi", 100))
        .unwrap_err();
    assert!(matches!(err, MessageError::ConversationNotFound(_)));
}

/// Re-appending the same ID returns the stored message instead of duplicating it
pub fn test_append_is_idempotent_by_id<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let first = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "hi", 100))
        .unwrap();
    let retried = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "hi", 100))
        .unwrap();

    assert_eq!(first, retried);
    assert_eq!(storage.messages(&conversation.id).unwrap().len(), 1);
}

/// Lookup by ID is scoped to the conversation
pub fn test_find_message<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let a = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let b = storage.ensure_conversation(&pair("u1", "u3")).unwrap();
    storage
        .append_message(new_message(&a.id, "m1", "u1", "hi", 100))
        .unwrap();

    let message_id = MessageId::new("m1").unwrap();
    let found = storage.find_message(&a.id, &message_id).unwrap().unwrap();
    assert_eq!(found.text, "hi");
    assert!(storage.find_message(&b.id, &message_id).unwrap().is_none());
}

/// Pages honour limit, offset and sort order
pub fn test_messages_page<S>(storage: S)
where
    S: ConversationStorage + MessageStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    for i in 0..5u64 {
        storage
            .append_message(new_message(
                &conversation.id,
                &format!("m{i}"),
                "u1",
                &format!("msg {i}"),
                100 + i,
            ))
            .unwrap();
    }

    let texts = |pagination: Pagination| -> Vec<String> {
        storage
            .messages_page(&conversation.id, pagination)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect()
    };

    assert_eq!(
        texts(Pagination::new(Some(2), Some(1))),
        vec!["msg 1", "msg 2"]
    );
    assert_eq!(
        texts(Pagination::with_sort_order(
            Some(2),
            None,
            MessageSortOrder::Descending
        )),
        vec!["msg 4", "msg 3"]
    );
    assert!(texts(Pagination::new(Some(10), Some(10))).is_empty());

    let err = storage
        .messages_page(&conversation.id, Pagination::new(Some(0), None))
        .unwrap_err();
    assert!(matches!(err, MessageError::InvalidParameters(_)));
}
