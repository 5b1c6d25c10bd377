//! Per-user room fan-out consumed by the Consumer (spec §4.7, wire
//! shape in §6). Mirrors the teacher's `WebSocketManager` (per-channel
//! `tokio::sync::broadcast`), extended with connection refcounting so
//! `setUserOffline` only fires on the last connection close (spec §9
//! "Presence offline on multi-connection").
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use crate::app::errors::RealtimeError;
use crate::app::models::DieselUlid;
use crate::app::presence::{PresenceBackend, PresenceIndex};

pub const MESSAGE_RECEIVED_EVENT: &str = "message_received";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSenderInfo {
    #[serde(rename = "_id")]
    pub id: DieselUlid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "messageId")]
    pub message_id: DieselUlid,
    #[serde(rename = "conversationId")]
    pub conversation_id: DieselUlid,
    #[serde(rename = "senderId")]
    pub sender_id: DieselUlid,
    #[serde(rename = "senderInfo")]
    pub sender_info: NotificationSenderInfo,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isAutoMessage")]
    pub is_auto_message: bool,
}

#[derive(Debug, Clone, Serialize)]
struct WireEvent<'a> {
    event: &'a str,
    payload: &'a NotificationPayload,
}

#[async_trait]
pub trait RealtimeBus: Send + Sync {
    async fn publish_to_user(&self, user_id: DieselUlid, event: &str, payload: &NotificationPayload) -> Result<(), RealtimeError>;
}

/// In-process WebSocket-style fan-out: one broadcast channel per
/// `user:{id}` room, connections subscribe and drop independently.
pub struct WebSocketBus<B: PresenceBackend> {
    presence: Arc<PresenceIndex<B>>,
    channels: RwLock<HashMap<DieselUlid, broadcast::Sender<String>>>,
    connection_counts: RwLock<HashMap<DieselUlid, usize>>,
}

impl<B: PresenceBackend> WebSocketBus<B> {
    pub fn new(presence: Arc<PresenceIndex<B>>) -> Self {
        Self {
            presence,
            channels: RwLock::new(HashMap::new()),
            connection_counts: RwLock::new(HashMap::new()),
        }
    }

    async fn channel(&self, user_id: DieselUlid) -> broadcast::Sender<String> {
        let mut channels = self.channels.write().await;
        channels.entry(user_id).or_insert_with(|| broadcast::channel(32).0).clone()
    }

    /// Called by the transport layer when a user's connection opens.
    /// Only marks the user online in the Presence Index on the first
    /// concurrent connection.
    pub async fn register_connection(&self, user_id: DieselUlid, username: &str) -> broadcast::Receiver<String> {
        let sender = self.channel(user_id).await;
        let receiver = sender.subscribe();

        let mut counts = self.connection_counts.write().await;
        let count = counts.entry(user_id).or_insert(0);
        *count += 1;
        let first_connection = *count == 1;
        drop(counts);

        if first_connection {
            if let Err(e) = self.presence.set_user_online(user_id, username).await {
                warn!(user_id = %user_id, error = %e, "failed to mark user online");
            }
        }

        receiver
    }

    /// Called by the transport layer when a user's connection closes.
    /// Only marks the user offline once the last connection has gone.
    pub async fn unregister_connection(&self, user_id: DieselUlid) {
        let mut counts = self.connection_counts.write().await;
        let last_connection = match counts.get_mut(&user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                counts.remove(&user_id);
                true
            }
            None => return,
        };
        drop(counts);

        if last_connection {
            self.channels.write().await.remove(&user_id);
            if let Err(e) = self.presence.set_user_offline(user_id).await {
                warn!(user_id = %user_id, error = %e, "failed to mark user offline");
            }
        }
    }
}

#[async_trait]
impl<B: PresenceBackend> RealtimeBus for WebSocketBus<B> {
    async fn publish_to_user(&self, user_id: DieselUlid, event: &str, payload: &NotificationPayload) -> Result<(), RealtimeError> {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(&user_id) else {
            // No live connection to fan out to; the caller already
            // checked presence, so this is a benign race, not an error.
            return Ok(());
        };

        let wire = WireEvent { event, payload };
        let serialized = serde_json::to_string(&wire).map_err(|e| RealtimeError::DeliveryFailed(e.to_string()))?;

        // `send` errors only when there are zero receivers, which is not
        // a failure worth surfacing — the socket closed between the
        // presence check and this publish.
        let _ = sender.send(serialized);
        Ok(())
    }
}
