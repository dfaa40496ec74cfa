//! Memory storage implementation tests using shared test functions

use souk_memory_storage::SoukMemoryStorage;

mod shared;

/// Macro to generate tests that run against Memory storage using shared test functions
macro_rules! test_memory_storage {
    ($test_name:ident, $test_fn:path) => {
        #[test]
        fn $test_name() {
            let storage = SoukMemoryStorage::default();
            $test_fn(storage);
        }
    };
}

// Conversation functionality tests
test_memory_storage!(
    test_ensure_conversation_is_idempotent_memory,
    shared::conversation_tests::test_ensure_conversation_is_idempotent
);

test_memory_storage!(
    test_find_missing_conversation_memory,
    shared::conversation_tests::test_find_missing_conversation
);

test_memory_storage!(
    test_conversations_for_participant_memory,
    shared::conversation_tests::test_conversations_for_participant
);

test_memory_storage!(
    test_apply_message_effect_memory,
    shared::conversation_tests::test_apply_message_effect
);

test_memory_storage!(
    test_apply_message_effect_keeps_newest_summary_memory,
    shared::conversation_tests::test_apply_message_effect_keeps_newest_summary
);

test_memory_storage!(
    test_apply_message_effect_rejects_outsider_memory,
    shared::conversation_tests::test_apply_message_effect_rejects_outsider
);

test_memory_storage!(
    test_mutations_on_missing_conversation_memory,
    shared::conversation_tests::test_mutations_on_missing_conversation
);

test_memory_storage!(
    test_increment_and_reset_unread_memory,
    shared::conversation_tests::test_increment_and_reset_unread
);

test_memory_storage!(
    test_concurrent_increments_do_not_lose_updates_memory,
    shared::conversation_tests::test_concurrent_increments_do_not_lose_updates
);

test_memory_storage!(
    test_concurrent_ensure_converges_memory,
    shared::conversation_tests::test_concurrent_ensure_converges
);

test_memory_storage!(
    test_set_last_message_memory,
    shared::conversation_tests::test_set_last_message
);

test_memory_storage!(
    test_changes_are_published_memory,
    shared::conversation_tests::test_changes_are_published
);

// Message functionality tests
test_memory_storage!(
    test_append_and_order_messages_memory,
    shared::message_tests::test_append_and_order_messages
);

test_memory_storage!(
    test_late_commit_lands_at_tail_memory,
    shared::message_tests::test_late_commit_lands_at_tail
);

test_memory_storage!(
    test_append_rejects_blank_text_memory,
    shared::message_tests::test_append_rejects_blank_text
);

test_memory_storage!(
    test_append_requires_conversation_memory,
    shared::message_tests::test_append_requires_conversation
);

test_memory_storage!(
    test_append_is_idempotent_by_id_memory,
    shared::message_tests::test_append_is_idempotent_by_id
);

test_memory_storage!(test_find_message_memory, shared::message_tests::test_find_message);

test_memory_storage!(
    test_messages_page_memory,
    shared::message_tests::test_messages_page
);
