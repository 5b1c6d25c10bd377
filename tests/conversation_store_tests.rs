use autopair::app::models::DieselUlid;
use autopair::app::stores::memory::InMemoryConversationStore;
use autopair::app::stores::ConversationStore;

#[tokio::test]
async fn creating_the_same_pair_twice_converges_on_one_conversation() {
    let store = InMemoryConversationStore::new();
    let a = DieselUlid::new();
    let b = DieselUlid::new();

    let first = store.create(a, b).await.unwrap();
    let second = store.create(b, a).await.unwrap();

    assert_eq!(first.id, second.id, "racing creates for the same pair converge on the existing row");
    assert!(store.find_between_users(a, b).await.unwrap().is_some());
}

#[tokio::test]
async fn participant_order_does_not_affect_lookup() {
    let store = InMemoryConversationStore::new();
    let a = DieselUlid::new();
    let b = DieselUlid::new();
    let created = store.create(a, b).await.unwrap();

    let found_ab = store.find_between_users(a, b).await.unwrap().unwrap();
    let found_ba = store.find_between_users(b, a).await.unwrap().unwrap();
    assert_eq!(found_ab.id, created.id);
    assert_eq!(found_ba.id, created.id);
}

#[tokio::test]
async fn update_last_message_stamps_the_summary_fields() {
    let store = InMemoryConversationStore::new();
    let a = DieselUlid::new();
    let b = DieselUlid::new();
    let conversation = store.create(a, b).await.unwrap();

    let now = chrono::Utc::now();
    store.update_last_message(conversation.id, "hello", a, now).await.unwrap();

    let updated = store.find_by_id(conversation.id).await.unwrap().unwrap();
    assert_eq!(updated.last_message_content.as_deref(), Some("hello"));
    assert_eq!(updated.last_message_sender_id, Some(a));

    let summary = updated.last_message().expect("last message summary once a message has landed");
    assert_eq!(summary.content, "hello");
    assert_eq!(summary.sender_id, a);
    assert_eq!(summary.timestamp, now);
}

#[tokio::test]
async fn last_message_is_none_before_any_message_lands() {
    let store = InMemoryConversationStore::new();
    let a = DieselUlid::new();
    let b = DieselUlid::new();
    let conversation = store.create(a, b).await.unwrap();

    assert!(conversation.last_message().is_none());
}
