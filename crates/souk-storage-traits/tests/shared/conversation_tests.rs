//! Conversation storage test functions

use std::collections::BTreeSet;

use souk_storage_traits::conversations::ConversationStorage;
use souk_storage_traits::conversations::error::ConversationError;
use souk_storage_traits::conversations::types::LastMessage;
use souk_storage_traits::messages::MessageStorage;
use souk_storage_traits::{SoukStorageProvider, StorageChange};

use souk_storage_traits::test_utils::{identity, new_message, pair};

/// Creating a conversation twice yields one record, unchanged
pub fn test_ensure_conversation_is_idempotent<S>(storage: S)
where
    S: ConversationStorage,
{
    let pair = pair("u2", "u1");
    let first = storage.ensure_conversation(&pair).unwrap();
    assert_eq!(first.id.as_str(), "u1_u2");
    assert_eq!(first.unread_for(&identity("u1")), 0);
    assert_eq!(first.unread_for(&identity("u2")), 0);
    assert!(first.last_message.is_none());

    let second = storage.ensure_conversation(&pair).unwrap();
    assert_eq!(first, second);

    let all = storage
        .conversations_for_participant(&identity("u1"))
        .unwrap();
    assert_eq!(all.len(), 1);
}

/// Looking up a conversation that was never created returns None
pub fn test_find_missing_conversation<S>(storage: S)
where
    S: ConversationStorage,
{
    let id = pair("u1", "u2").conversation_id();
    assert!(storage.find_conversation(&id).unwrap().is_none());
}

/// Listing only returns conversations the identity takes part in
pub fn test_conversations_for_participant<S>(storage: S)
where
    S: ConversationStorage,
{
    storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    storage.ensure_conversation(&pair("u1", "u3")).unwrap();
    storage.ensure_conversation(&pair("u2", "u3")).unwrap();

    let ids: BTreeSet<String> = storage
        .conversations_for_participant(&identity("u1"))
        .unwrap()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(
        ids,
        BTreeSet::from(["u1_u2".to_string(), "u1_u3".to_string()])
    );

    assert!(
        storage
            .conversations_for_participant(&identity("u9"))
            .unwrap()
            .is_empty()
    );
}

/// A send updates the summary and increments the receiver only
pub fn test_apply_message_effect<S>(storage: S)
where
    S: SoukStorageProvider,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let message = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "hi", 100))
        .unwrap();

    let updated = storage
        .apply_message_effect(
            &conversation.id,
            &identity("u1"),
            LastMessage::from_message(&message),
        )
        .unwrap();

    assert_eq!(updated.unread_for(&identity("u2")), 1);
    assert_eq!(updated.unread_for(&identity("u1")), 0);
    let last = updated.last_message.as_ref().unwrap();
    assert_eq!(last.text, "hi");
    assert_eq!(last.sender, identity("u1"));
    assert!(updated.revision > conversation.revision);

    let stored = storage.find_conversation(&conversation.id).unwrap().unwrap();
    assert_eq!(stored, updated);
}

/// An older summary never replaces a newer one, but still counts as unread
pub fn test_apply_message_effect_keeps_newest_summary<S>(storage: S)
where
    S: SoukStorageProvider,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let older = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "first", 100))
        .unwrap();
    let newer = storage
        .append_message(new_message(&conversation.id, "m2", "u1", "second", 200))
        .unwrap();

    storage
        .apply_message_effect(&conversation.id, &identity("u1"), LastMessage::from_message(&newer))
        .unwrap();
    let updated = storage
        .apply_message_effect(&conversation.id, &identity("u1"), LastMessage::from_message(&older))
        .unwrap();

    assert_eq!(updated.unread_for(&identity("u2")), 2);
    assert_eq!(updated.last_message.unwrap().text, "second");
}

/// A sender outside the pair changes nothing
pub fn test_apply_message_effect_rejects_outsider<S>(storage: S)
where
    S: SoukStorageProvider,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let message = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "hi", 100))
        .unwrap();
    let mut summary = LastMessage::from_message(&message);
    summary.sender = identity("u3");

    let err = storage
        .apply_message_effect(&conversation.id, &identity("u3"), summary)
        .unwrap_err();
    assert!(matches!(err, ConversationError::NotParticipant { .. }));

    let stored = storage.find_conversation(&conversation.id).unwrap().unwrap();
    assert_eq!(stored, conversation);
}

/// Effects against a missing conversation report NotFound
pub fn test_mutations_on_missing_conversation<S>(storage: S)
where
    S: ConversationStorage,
{
    let id = pair("u1", "u2").conversation_id();
    assert!(matches!(
        storage.increment_unread(&id, &identity("u2")),
        Err(ConversationError::NotFound(_))
    ));
    assert!(matches!(
        storage.reset_unread(&id, &identity("u2")),
        Err(ConversationError::NotFound(_))
    ));
    assert!(matches!(
        storage.set_last_message(&id, None),
        Err(ConversationError::NotFound(_))
    ));
}

/// Increment is a delta and reset is unconditional and idempotent
pub fn test_increment_and_reset_unread<S>(storage: S)
where
    S: ConversationStorage,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let receiver = identity("u2");

    assert_eq!(storage.increment_unread(&conversation.id, &receiver).unwrap(), 1);
    assert_eq!(storage.increment_unread(&conversation.id, &receiver).unwrap(), 2);

    assert!(storage.reset_unread(&conversation.id, &receiver).unwrap());
    let after_reset = storage.find_conversation(&conversation.id).unwrap().unwrap();
    assert_eq!(after_reset.unread_for(&receiver), 0);

    // Second reset is a no-op, not an error, and does not bump the revision
    assert!(!storage.reset_unread(&conversation.id, &receiver).unwrap());
    let after_noop = storage.find_conversation(&conversation.id).unwrap().unwrap();
    assert_eq!(after_noop.revision, after_reset.revision);

    // In-flight increment landing after a reset legitimately leaves one unread
    assert_eq!(storage.increment_unread(&conversation.id, &receiver).unwrap(), 1);
}

/// Concurrent increments from independent writers all land
pub fn test_concurrent_increments_do_not_lose_updates<S>(storage: S)
where
    S: ConversationStorage + Sync,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let receiver = identity("u2");
    let writers = 8;
    let per_writer = 25;

    std::thread::scope(|scope| {
        for _ in 0..writers {
            scope.spawn(|| {
                for _ in 0..per_writer {
                    storage.increment_unread(&conversation.id, &receiver).unwrap();
                }
            });
        }
    });

    let stored = storage.find_conversation(&conversation.id).unwrap().unwrap();
    assert_eq!(stored.unread_for(&receiver), (writers * per_writer) as u32);
}

/// Concurrent ensure calls from both sides converge to one record
pub fn test_concurrent_ensure_converges<S>(storage: S)
where
    S: ConversationStorage + Sync,
{
    std::thread::scope(|scope| {
        for i in 0..8 {
            let storage = &storage;
            scope.spawn(move || {
                let pair = if i % 2 == 0 {
                    pair("buyer", "seller")
                } else {
                    pair("seller", "buyer")
                };
                storage.ensure_conversation(&pair).unwrap();
            });
        }
    });

    let all = storage
        .conversations_for_participant(&identity("buyer"))
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].revision, 1);
}

/// Rewriting the summary from the log replaces it unconditionally
pub fn test_set_last_message<S>(storage: S)
where
    S: SoukStorageProvider,
{
    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    let message = storage
        .append_message(new_message(&conversation.id, "m1", "u2", "offer: 40", 100))
        .unwrap();

    let updated = storage
        .set_last_message(&conversation.id, Some(LastMessage::from_message(&message)))
        .unwrap();
    assert_eq!(updated.last_message.as_ref().unwrap().text, "offer: 40");
    assert_eq!(updated.unread_for(&identity("u1")), 0);

    let cleared = storage.set_last_message(&conversation.id, None).unwrap();
    assert!(cleared.last_message.is_none());
}

/// Every effective write is announced on the change feed
pub fn test_changes_are_published<S>(storage: S)
where
    S: SoukStorageProvider,
{
    let mut rx = storage.subscribe_changes();

    let conversation = storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    match rx.try_recv().unwrap() {
        StorageChange::ConversationChanged {
            conversation_id,
            revision,
        } => {
            assert_eq!(conversation_id, conversation.id);
            assert_eq!(revision, conversation.revision);
        }
        other => panic!("unexpected change: {other:?}"),
    }

    // Existing record: nothing to announce
    storage.ensure_conversation(&pair("u1", "u2")).unwrap();
    assert!(rx.try_recv().is_err());

    let message = storage
        .append_message(new_message(&conversation.id, "m1", "u1", "hi", 100))
        .unwrap();
    assert!(matches!(
        rx.try_recv().unwrap(),
        StorageChange::MessageAppended { seq, .. } if seq == message.seq
    ));

    storage.increment_unread(&conversation.id, &identity("u2")).unwrap();
    assert!(matches!(
        rx.try_recv().unwrap(),
        StorageChange::ConversationChanged { .. }
    ));

    // No-op reset of the sender's zero counter stays silent
    storage.reset_unread(&conversation.id, &identity("u1")).unwrap();
    assert!(rx.try_recv().is_err());
}
