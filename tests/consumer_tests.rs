use std::sync::Arc;
use std::time::Duration;

use autopair::app::broker::{Broker, Envelope, InMemoryBroker};
use autopair::app::consumer::{ConsumerEvent, ConsumerWorker};
use autopair::app::models::planned_message::NewPlannedMessage;
use autopair::app::models::user::NewUser;
use autopair::app::models::DieselUlid;
use autopair::app::presence::{MemoryPresenceBackend, PresenceIndex};
use autopair::app::realtime::{RealtimeBus, WebSocketBus};
use autopair::app::stores::memory::{FlakyUserStore, InMemoryConversationStore, InMemoryMessageStore, InMemoryPlannedMessageStore, InMemoryUserStore};
use autopair::app::stores::PlannedMessageStore;
use autopair::config::consumer::ConsumerConfig;
use chrono::Utc;

fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        max_retries: 2,
        retry_delay_ms: 5,
        content_max_len: 1000,
    }
}

type Worker = ConsumerWorker<InMemoryUserStore, InMemoryPlannedMessageStore, InMemoryConversationStore, InMemoryMessageStore, MemoryPresenceBackend>;
type FlakyWorker = ConsumerWorker<FlakyUserStore, InMemoryPlannedMessageStore, InMemoryConversationStore, InMemoryMessageStore, MemoryPresenceBackend>;

async fn recv_event(events: &mut tokio::sync::broadcast::Receiver<ConsumerEvent>) -> ConsumerEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv()).await.expect("event in time").expect("channel open")
}

#[tokio::test]
async fn processes_a_well_formed_envelope_and_creates_a_chat_message() {
    let users = InMemoryUserStore::new();
    let sender = users.seed(NewUser::new("alice", "alice@example.com", "hash").unwrap()).await;
    let receiver = users.seed(NewUser::new("bob", "bob@example.com", "hash").unwrap()).await;

    let planned = InMemoryPlannedMessageStore::new();
    let new_planned = NewPlannedMessage::new(sender.id, receiver.id, "hello there".into(), Utc::now());
    let auto_message_id = new_planned.id;
    planned.bulk_insert(vec![new_planned]).await.unwrap();

    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users.shared());

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime: Arc<dyn RealtimeBus> = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<Worker> = Arc::new(ConsumerWorker::new(
        Arc::new(users),
        Arc::new(planned.clone()),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    let envelope = Envelope::new(auto_message_id, sender.id, receiver.id, "hello there".into(), Utc::now());
    broker.send_to_queue(&envelope, 0).await.unwrap();

    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));
    match recv_event(&mut events).await {
        ConsumerEvent::MessageProcessed { auto_message_id: id } => assert_eq!(id, auto_message_id),
        other => panic!("expected MessageProcessed, got {other:?}"),
    }

    assert_eq!(messages.count().await, 1);
    let stored = planned.all().await.into_iter().find(|m| m.id == auto_message_id).unwrap();
    assert!(stored.is_sent);

    let stats = worker.get_stats().await;
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_successful, 1);
    assert_eq!(stats.total_failed, 0);

    worker.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered_without_retry() {
    let users = InMemoryUserStore::new();
    let planned = InMemoryPlannedMessageStore::new();
    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users.shared());

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime: Arc<dyn RealtimeBus> = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<Worker> = Arc::new(ConsumerWorker::new(
        Arc::new(users),
        Arc::new(planned),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    broker.push_raw(b"not json".to_vec(), 0).await.unwrap();

    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));
    match recv_event(&mut events).await {
        ConsumerEvent::MessageFailed { auto_message_id, error_code } => {
            assert!(auto_message_id.is_none());
            assert_eq!(error_code, "MALFORMED_PAYLOAD");
        }
        other => panic!("expected MessageFailed, got {other:?}"),
    }
    assert_eq!(messages.count().await, 0);

    worker.stop().await;
}

#[tokio::test]
async fn missing_receiver_retries_then_dead_letters_at_max_retries() {
    let users = InMemoryUserStore::new();
    let sender = users.seed(NewUser::new("alice", "alice@example.com", "hash").unwrap()).await;
    let ghost_receiver = DieselUlid::new();

    let planned = InMemoryPlannedMessageStore::new();
    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users.shared());

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime: Arc<dyn RealtimeBus> = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<Worker> = Arc::new(ConsumerWorker::new(
        Arc::new(users),
        Arc::new(planned),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    let envelope = Envelope::new(DieselUlid::new(), sender.id, ghost_receiver, "hi".into(), Utc::now());
    broker.send_to_queue(&envelope, 0).await.unwrap();

    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));

    // max_retries = 2: retry_count 0 and 1 republish silently (no event),
    // retry_count 2 dead-letters instead of retrying again.
    match recv_event(&mut events).await {
        ConsumerEvent::MessageFailed { auto_message_id, error_code } => {
            assert!(auto_message_id.is_some());
            assert_eq!(error_code, "RECEIVER_NOT_FOUND");
        }
        other => panic!("expected a terminal MessageFailed after retries, got {other:?}"),
    }

    let stats = worker.get_stats().await;
    assert_eq!(stats.total_processed, 1, "only the terminal dead-letter counts, not each retry attempt");
    assert_eq!(stats.total_failed, 1);

    worker.stop().await;
}

#[tokio::test]
async fn redelivering_an_already_sent_planned_message_does_not_duplicate_it() {
    let users = InMemoryUserStore::new();
    let sender = users.seed(NewUser::new("alice", "alice@example.com", "hash").unwrap()).await;
    let receiver = users.seed(NewUser::new("bob", "bob@example.com", "hash").unwrap()).await;

    let planned = InMemoryPlannedMessageStore::new();
    let new_planned = NewPlannedMessage::new(sender.id, receiver.id, "hello there".into(), Utc::now());
    let auto_message_id = new_planned.id;
    planned.bulk_insert(vec![new_planned]).await.unwrap();

    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users.shared());

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime: Arc<dyn RealtimeBus> = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<Worker> = Arc::new(ConsumerWorker::new(
        Arc::new(users),
        Arc::new(planned.clone()),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    let envelope = Envelope::new(auto_message_id, sender.id, receiver.id, "hello there".into(), Utc::now());

    broker.send_to_queue(&envelope, 0).await.unwrap();
    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));
    match recv_event(&mut events).await {
        ConsumerEvent::MessageProcessed { auto_message_id: id } => assert_eq!(id, auto_message_id),
        other => panic!("expected MessageProcessed, got {other:?}"),
    }
    assert_eq!(messages.count().await, 1);

    // A redelivery of the exact same envelope — e.g. the broker redelivers
    // after a lost ack. `is_sent` is already true, so the guard must
    // short-circuit rather than create a second ChatMessage.
    broker.send_to_queue(&envelope, 0).await.unwrap();
    match recv_event(&mut events).await {
        ConsumerEvent::MessageProcessed { auto_message_id: id } => assert_eq!(id, auto_message_id),
        other => panic!("expected the redelivery to still ack as successful, got {other:?}"),
    }

    assert_eq!(messages.count().await, 1, "the duplicate-delivery guard must not create a second ChatMessage");

    worker.stop().await;
}

#[tokio::test]
async fn notifies_over_realtime_when_receiver_is_online() {
    let users = InMemoryUserStore::new();
    let sender = users.seed(NewUser::new("alice", "alice@example.com", "hash").unwrap()).await;
    let receiver = users.seed(NewUser::new("bob", "bob@example.com", "hash").unwrap()).await;

    let planned = InMemoryPlannedMessageStore::new();
    let new_planned = NewPlannedMessage::new(sender.id, receiver.id, "hello there".into(), Utc::now());
    let auto_message_id = new_planned.id;
    planned.bulk_insert(vec![new_planned]).await.unwrap();

    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users.shared());

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime_concrete = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    // Receiver's socket connects before the envelope is delivered — the
    // consumer must see them online and publish the notification.
    let mut receiver_socket = realtime_concrete.register_connection(receiver.id, &receiver.username).await;
    let realtime: Arc<dyn RealtimeBus> = realtime_concrete.clone() as Arc<dyn RealtimeBus>;
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<Worker> = Arc::new(ConsumerWorker::new(
        Arc::new(users),
        Arc::new(planned.clone()),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    let envelope = Envelope::new(auto_message_id, sender.id, receiver.id, "hello there".into(), Utc::now());
    broker.send_to_queue(&envelope, 0).await.unwrap();

    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));
    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::MessageProcessed { .. }));

    let raw = tokio::time::timeout(Duration::from_secs(2), receiver_socket.recv())
        .await
        .expect("notification published in time")
        .expect("receiver channel still open");
    let wire: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(wire["event"], "message_received");
    let payload = &wire["payload"];
    assert_eq!(payload["senderId"], sender.id.to_string());
    assert_eq!(payload["content"], "hello there");
    assert_eq!(payload["isAutoMessage"], true);
    assert_eq!(payload["senderInfo"]["_id"], sender.id.to_string());
    assert_eq!(payload["senderInfo"]["username"], "alice");
    assert_eq!(payload["senderInfo"]["email"], "alice@example.com");

    worker.stop().await;
}

#[tokio::test]
async fn transient_store_failure_retries_then_succeeds() {
    let users = InMemoryUserStore::new();
    let sender = users.seed(NewUser::new("alice", "alice@example.com", "hash").unwrap()).await;
    let receiver = users.seed(NewUser::new("bob", "bob@example.com", "hash").unwrap()).await;
    let users_shared = users.shared();

    // Fails only the very first `find_by_id` call (the sender lookup on
    // the first delivery attempt); every later lookup succeeds.
    let flaky_users = FlakyUserStore::new(users, 1);

    let planned = InMemoryPlannedMessageStore::new();
    let new_planned = NewPlannedMessage::new(sender.id, receiver.id, "hello there".into(), Utc::now());
    let auto_message_id = new_planned.id;
    planned.bulk_insert(vec![new_planned]).await.unwrap();

    let conversations = InMemoryConversationStore::new();
    let messages = InMemoryMessageStore::new(users_shared);

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let realtime: Arc<dyn RealtimeBus> = Arc::new(WebSocketBus::new(Arc::clone(&presence)));
    let broker_dyn: Arc<dyn Broker> = broker.clone();

    let worker: Arc<FlakyWorker> = Arc::new(ConsumerWorker::new(
        Arc::new(flaky_users),
        Arc::new(planned.clone()),
        Arc::new(conversations),
        Arc::new(messages.clone()),
        broker_dyn,
        Arc::clone(&presence),
        realtime,
        test_config(),
        8,
    ));
    let mut events = worker.subscribe_events();
    worker.start().await.unwrap();

    let envelope = Envelope::new(auto_message_id, sender.id, receiver.id, "hello there".into(), Utc::now());
    broker.send_to_queue(&envelope, 0).await.unwrap();

    assert!(matches!(recv_event(&mut events).await, ConsumerEvent::ConsumerStarted));
    // The first attempt's sender lookup fails transiently and is silently
    // republished for retry (no event); the retried attempt succeeds.
    match recv_event(&mut events).await {
        ConsumerEvent::MessageProcessed { auto_message_id: id } => assert_eq!(id, auto_message_id),
        other => panic!("expected the retried attempt to succeed, got {other:?}"),
    }

    assert_eq!(messages.count().await, 1);
    let stats = worker.get_stats().await;
    assert_eq!(stats.total_successful, 1);
    assert_eq!(stats.total_failed, 0, "a transient failure that is later retried successfully must not count as a failure");

    worker.stop().await;
}
