use std::sync::Arc;

use autopair::app::broker::{Broker, InMemoryBroker};
use autopair::app::dispatcher::Dispatcher;
use autopair::app::models::planned_message::NewPlannedMessage;
use autopair::app::models::DieselUlid;
use autopair::app::stores::memory::InMemoryPlannedMessageStore;
use autopair::app::stores::PlannedMessageStore;
use chrono::{Duration, Utc};

#[tokio::test]
async fn dispatches_due_messages_and_marks_them_queued() {
    let planned = InMemoryPlannedMessageStore::new();
    let due = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "hello".into(), Utc::now() - Duration::minutes(1));
    let future = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "later".into(), Utc::now() + Duration::hours(1));
    let due_id = due.id;
    planned.bulk_insert(vec![due, future]).await.unwrap();

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();

    let dispatcher = Dispatcher::new(Arc::new(planned.clone()), broker);
    let report = dispatcher.process_pending_messages().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.queued, 1);
    assert_eq!(report.failed, 0);

    let stored = planned.all().await;
    let due_message = stored.iter().find(|m| m.id == due_id).unwrap();
    assert!(due_message.is_queued);
    assert!(!due_message.is_sent);
}

#[tokio::test]
async fn skips_dispatch_entirely_when_nothing_is_due() {
    let planned = InMemoryPlannedMessageStore::new();
    let future = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "later".into(), Utc::now() + Duration::hours(1));
    planned.bulk_insert(vec![future]).await.unwrap();

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    let dispatcher = Dispatcher::new(Arc::new(planned.clone()), broker);

    let report = dispatcher.process_pending_messages().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.queued, 0);
}

#[tokio::test]
async fn connects_the_broker_lazily_before_publishing() {
    let planned = InMemoryPlannedMessageStore::new();
    let due = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "hi".into(), Utc::now() - Duration::seconds(1));
    planned.bulk_insert(vec![due]).await.unwrap();

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    assert!(!broker.is_connection_active().await);

    let dispatcher = Dispatcher::new(Arc::new(planned.clone()), Arc::clone(&broker));
    let report = dispatcher.process_pending_messages().await.unwrap();

    assert!(broker.is_connection_active().await);
    assert_eq!(report.queued, 1);
}

#[tokio::test]
async fn partial_batch_publish_marks_only_the_successes_queued() {
    let planned = InMemoryPlannedMessageStore::new();
    let first = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "one".into(), Utc::now() - Duration::minutes(3));
    let second = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "two".into(), Utc::now() - Duration::minutes(2));
    let third = NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "three".into(), Utc::now() - Duration::minutes(1));
    let (first_id, second_id, third_id) = (first.id, second.id, third.id);
    planned.bulk_insert(vec![first, second, third]).await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();
    broker.fail_nth_publish(2); // the middle message (by send_date order) fails to publish
    let broker_dyn: Arc<dyn Broker> = broker;

    let dispatcher = Dispatcher::new(Arc::new(planned.clone()), broker_dyn);
    let report = dispatcher.process_pending_messages().await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.queued, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains(&second_id.to_string()));

    let stored = planned.all().await;
    let is_queued = |id: DieselUlid| stored.iter().find(|m| m.id == id).unwrap().is_queued;
    assert!(is_queued(first_id));
    assert!(!is_queued(second_id));
    assert!(is_queued(third_id));
}

#[tokio::test]
async fn batches_respect_the_configured_size() {
    let planned = InMemoryPlannedMessageStore::new();
    let mut items = Vec::new();
    for _ in 0..5 {
        items.push(NewPlannedMessage::new(DieselUlid::new(), DieselUlid::new(), "hi".into(), Utc::now() - Duration::seconds(1)));
    }
    planned.bulk_insert(items).await.unwrap();

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    broker.connect().await.unwrap();
    let dispatcher = Dispatcher::new(Arc::new(planned.clone()), broker).with_batch_size(2);

    let report = dispatcher.process_pending_messages().await.unwrap();
    assert_eq!(report.processed, 5);
    assert_eq!(report.queued, 5);
}
