use std::sync::Arc;
use std::time::Duration;

use autopair::app::models::DieselUlid;
use autopair::app::presence::{MemoryPresenceBackend, PresenceIndex};
use autopair::app::realtime::{NotificationPayload, NotificationSenderInfo, RealtimeBus, WebSocketBus};
use chrono::Utc;

fn payload(message_id: DieselUlid, conversation_id: DieselUlid, sender_id: DieselUlid) -> NotificationPayload {
    NotificationPayload {
        message_id,
        conversation_id,
        sender_id,
        sender_info: NotificationSenderInfo {
            id: sender_id,
            username: "alice".into(),
            email: "alice@example.com".into(),
        },
        content: "hi".into(),
        created_at: Utc::now(),
        is_auto_message: true,
    }
}

#[tokio::test]
async fn registering_the_first_connection_marks_the_user_online() {
    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let bus = WebSocketBus::new(Arc::clone(&presence));
    let user = DieselUlid::new();

    let _receiver = bus.register_connection(user, "alice").await;
    assert!(presence.is_user_online(user).await.unwrap());
}

#[tokio::test]
async fn user_stays_online_until_the_last_connection_closes() {
    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let bus = WebSocketBus::new(Arc::clone(&presence));
    let user = DieselUlid::new();

    let _first = bus.register_connection(user, "alice").await;
    let _second = bus.register_connection(user, "alice").await;

    bus.unregister_connection(user).await;
    assert!(presence.is_user_online(user).await.unwrap(), "one connection remains, user stays online");

    bus.unregister_connection(user).await;
    assert!(!presence.is_user_online(user).await.unwrap(), "last connection closed, user goes offline");
}

#[tokio::test]
async fn publish_fans_out_to_every_subscriber_of_that_user() {
    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let bus = WebSocketBus::new(Arc::clone(&presence));
    let user = DieselUlid::new();

    let mut a = bus.register_connection(user, "alice").await;
    let mut b = bus.register_connection(user, "alice").await;

    let notification = payload(DieselUlid::new(), DieselUlid::new(), DieselUlid::new());
    bus.publish_to_user(user, "message_received", &notification).await.unwrap();

    let received_a = a.recv().await.unwrap();
    let received_b = b.recv().await.unwrap();
    assert!(received_a.contains("message_received"));
    assert_eq!(received_a, received_b);
}

#[tokio::test]
async fn publishing_to_a_user_with_no_connection_is_not_an_error() {
    let presence = Arc::new(PresenceIndex::new(MemoryPresenceBackend::new(), Duration::from_secs(60)));
    let bus = WebSocketBus::new(Arc::clone(&presence));
    let user = DieselUlid::new();

    let notification = payload(DieselUlid::new(), DieselUlid::new(), DieselUlid::new());
    assert!(bus.publish_to_user(user, "message_received", &notification).await.is_ok());
}
