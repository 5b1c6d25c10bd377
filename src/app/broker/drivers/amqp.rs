use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker as LapinAckerHandle;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use crate::app::broker::{Acker, Broker, Delivery, Envelope};
use crate::app::errors::BrokerError;
use crate::config::broker::BrokerConfig;

struct LapinAcker(LapinAckerHandle);

#[async_trait]
impl Acker for LapinAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0.ack(BasicAckOptions::default()).await.map_err(|e| BrokerError::AckFailed(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions { requeue, multiple: false })
            .await
            .map_err(|e| BrokerError::AckFailed(e.to_string()))
    }
}

/// Durable queue over RabbitMQ via `lapin`, matching spec §4.4's
/// durable-declaration / persistent-delivery / prefetch / explicit-ack
/// contract directly.
pub struct AmqpBroker {
    config: BrokerConfig,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl AmqpBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
            channel: RwLock::new(None),
        }
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        self.channel.read().await.clone().ok_or(BrokerError::NotConnected)
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(&self.config.url, options)
            .await
            .map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;

        let channel = connection.create_channel().await.map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;

        channel
            .queue_declare(&self.config.queue_name, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;

        channel
            .basic_qos(self.config.consumer_prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;

        *self.connection.write().await = Some(connection);
        *self.channel.write().await = Some(channel);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        if let Some(channel) = self.channel.write().await.take() {
            let _ = channel.close(0, "shutdown").await;
        }
        if let Some(connection) = self.connection.write().await.take() {
            connection.close(0, "shutdown").await.map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_connection_active(&self) -> bool {
        match self.connection.read().await.as_ref() {
            Some(connection) => connection.status().connected(),
            None => false,
        }
    }

    async fn send_to_queue(&self, envelope: &Envelope, retry_count: u32) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        let payload = serde_json::to_vec(envelope).map_err(|e| BrokerError::PublishFailed(e.to_string()))?;

        let mut headers = FieldTable::default();
        headers.insert("x-retry-count".into(), AMQPValue::LongUInt(retry_count));

        let properties = BasicProperties::default().with_delivery_mode(2).with_headers(headers);

        channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;

        Ok(())
    }

    async fn consume(&self) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let channel = self.channel().await?;
        let mut consumer = channel
            .basic_consume(
                &self.config.queue_name,
                "autopair-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::ConnectFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(self.config.consumer_prefetch as usize);

        tokio::spawn(async move {
            while let Some(result) = consumer.next().await {
                match result {
                    Ok(delivery) => {
                        let retry_count = delivery
                            .properties
                            .headers()
                            .as_ref()
                            .and_then(|headers| headers.inner().get("x-retry-count").cloned())
                            .and_then(|value| match value {
                                AMQPValue::LongUInt(v) => Some(v),
                                AMQPValue::ShortUInt(v) => Some(v as u32),
                                AMQPValue::LongLongInt(v) => Some(v.max(0) as u32),
                                _ => None,
                            })
                            .unwrap_or(0);

                        let frame = Delivery {
                            payload: delivery.data.clone(),
                            retry_count,
                            acker: Arc::new(LapinAcker(delivery.acker.clone())),
                        };

                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "broker delivery error"),
                }
            }
        });

        Ok(rx)
    }
}
