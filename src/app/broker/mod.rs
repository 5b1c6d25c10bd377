//! Durable broker abstraction (spec §4.4). One trait so the
//! Dispatcher and Consumer can be built against `AmqpBroker` in
//! production and `InMemoryBroker` in tests, mirroring the teacher's
//! `QueueDriver` / `MemoryQueueDriver` split in `src/app/jobs/mod.rs`.
pub mod drivers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::errors::BrokerError;
use crate::app::models::DieselUlid;

pub use drivers::amqp::AmqpBroker;
pub use drivers::memory::InMemoryBroker;

pub const ENVELOPE_TYPE: &str = "auto_message.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub envelope_type: String,
    #[serde(rename = "autoMessageId")]
    pub auto_message_id: DieselUlid,
    #[serde(rename = "senderId")]
    pub sender_id: DieselUlid,
    #[serde(rename = "receiverId")]
    pub receiver_id: DieselUlid,
    pub content: String,
    #[serde(rename = "originalSendDate")]
    pub original_send_date: DateTime<Utc>,
    #[serde(rename = "queuedAt")]
    pub queued_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(auto_message_id: DieselUlid, sender_id: DieselUlid, receiver_id: DieselUlid, content: String, original_send_date: DateTime<Utc>) -> Self {
        Self {
            envelope_type: ENVELOPE_TYPE.to_string(),
            auto_message_id,
            sender_id,
            receiver_id,
            content,
            original_send_date,
            queued_at: Utc::now(),
        }
    }
}

/// Acknowledges or rejects a single delivered frame. Split out of
/// `Delivery` so drivers can hand back a cheap, cloneable handle
/// instead of the whole consumer-side machinery.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

pub struct Delivery {
    pub payload: Vec<u8>,
    /// `x-retry-count` header, absent = 0 (spec §4.4/§6).
    pub retry_count: u32,
    pub acker: Arc<dyn Acker>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<(), BrokerError>;
    async fn disconnect(&self) -> Result<(), BrokerError>;
    async fn is_connection_active(&self) -> bool;

    /// Publishes with the durable/persistent contract spec §4.4 requires.
    /// `retry_count` becomes the `x-retry-count` header.
    async fn send_to_queue(&self, envelope: &Envelope, retry_count: u32) -> Result<(), BrokerError>;

    /// Starts consuming with the configured prefetch and explicit acks,
    /// handing back a receiver of `Delivery`. May only be called once
    /// per broker instance.
    async fn consume(&self) -> Result<tokio::sync::mpsc::Receiver<Delivery>, BrokerError>;
}
