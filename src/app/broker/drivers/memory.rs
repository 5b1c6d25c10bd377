use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::app::broker::{Acker, Broker, Delivery, Envelope};
use crate::app::errors::BrokerError;

struct NoopAcker;

#[async_trait]
impl Acker for NoopAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack(&self, _requeue: bool) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// In-process fake standing in for the AMQP broker in tests, the way
/// `MemoryQueueDriver` stands in for a real queue backend.
pub struct InMemoryBroker {
    connected: RwLock<bool>,
    sender: mpsc::Sender<Delivery>,
    receiver: Mutex<Option<mpsc::Receiver<Delivery>>>,
    publish_count: AtomicUsize,
    fail_at_publish: AtomicUsize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        Self {
            connected: RwLock::new(false),
            sender,
            receiver: Mutex::new(Some(receiver)),
            publish_count: AtomicUsize::new(0),
            fail_at_publish: AtomicUsize::new(0),
        }
    }

    /// Arms a one-shot failure: the `n`th call (1-indexed) to
    /// `send_to_queue` returns `Err(PublishFailed)` instead of
    /// publishing, simulating a mid-batch broker hiccup. Every other
    /// call succeeds normally.
    pub fn fail_nth_publish(&self, n: usize) {
        self.fail_at_publish.store(n, Ordering::SeqCst);
    }

    /// Pushes a raw payload straight onto the queue, bypassing
    /// `Envelope` serialization — used to simulate malformed or
    /// legacy-typed deliveries in tests.
    pub async fn push_raw(&self, payload: Vec<u8>, retry_count: u32) -> Result<(), BrokerError> {
        self.sender
            .send(Delivery {
                payload,
                retry_count,
                acker: Arc::new(NoopAcker),
            })
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        *self.connected.write().await = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        *self.connected.write().await = false;
        Ok(())
    }

    async fn is_connection_active(&self) -> bool {
        *self.connected.read().await
    }

    async fn send_to_queue(&self, envelope: &Envelope, retry_count: u32) -> Result<(), BrokerError> {
        if !self.is_connection_active().await {
            return Err(BrokerError::NotConnected);
        }

        let call = self.publish_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at_publish.load(Ordering::SeqCst) == call {
            return Err(BrokerError::PublishFailed("injected failure".to_string()));
        }

        let payload = serde_json::to_vec(envelope).map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
        self.push_raw(payload, retry_count).await
    }

    async fn consume(&self) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        self.receiver.lock().await.take().ok_or(BrokerError::NotConnected)
    }
}
