//! Long-lived broker consumer: parses, validates, materializes and
//! retries planned-message deliveries. See spec §4.5.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::broker::{Broker, Delivery, Envelope, ENVELOPE_TYPE};
use crate::app::errors::ValidationError;
use crate::app::models::message::NewChatMessage;
use crate::app::models::DieselUlid;
use crate::app::presence::{PresenceBackend, PresenceIndex};
use crate::app::realtime::{NotificationPayload, NotificationSenderInfo, RealtimeBus, MESSAGE_RECEIVED_EVENT};
use crate::app::stores::{ConversationStore, MessageStore, PlannedMessageStore, UserStore};
use crate::config::consumer::ConsumerConfig;

const STATS_WINDOW: usize = 100;

#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    ConsumerStarted,
    MessageProcessed { auto_message_id: DieselUlid },
    MessageFailed { auto_message_id: Option<DieselUlid>, error_code: String },
    ConsumerStopped,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsumerStats {
    pub is_running: bool,
    pub total_processed: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub average_processing_time: f64,
}

#[derive(Default)]
struct StatsInner {
    total_processed: u64,
    total_successful: u64,
    total_failed: u64,
    last_processed_at: Option<DateTime<Utc>>,
    window: VecDeque<u128>,
}

impl StatsInner {
    fn record_success(&mut self, elapsed: Duration) {
        self.total_processed += 1;
        self.total_successful += 1;
        self.last_processed_at = Some(Utc::now());
        if self.window.len() == STATS_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(elapsed.as_millis());
    }

    fn record_failure(&mut self) {
        self.total_processed += 1;
        self.total_failed += 1;
        self.last_processed_at = Some(Utc::now());
    }

    fn average_processing_time(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<u128>() as f64 / self.window.len() as f64
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    envelope_type: Option<String>,
    #[serde(rename = "autoMessageId")]
    auto_message_id: String,
    #[serde(rename = "senderId")]
    sender_id: String,
    #[serde(rename = "receiverId")]
    receiver_id: String,
    content: String,
    #[serde(rename = "originalSendDate")]
    original_send_date: DateTime<Utc>,
    #[serde(rename = "queuedAt")]
    queued_at: DateTime<Utc>,
}

/// Parses and validates a raw envelope (spec §4.5 step 2). Returns the
/// well-typed `Envelope` plus, on failure, the auto-message id when it
/// was itself well-formed (so callers can still tag failure events).
fn validate_queue_message(raw: RawEnvelope, max_len: usize) -> Result<Envelope, (ValidationError, Option<DieselUlid>)> {
    match raw.envelope_type.as_deref() {
        Some(t) if t == ENVELOPE_TYPE => {}
        other => return Err((ValidationError::UnsupportedEnvelopeType(other.unwrap_or("<missing>").to_string()), None)),
    }

    let auto_message_id =
        DieselUlid::from_string(&raw.auto_message_id).map_err(|_| (ValidationError::InvalidAutoMessageId(raw.auto_message_id.clone()), None))?;

    let sender_id =
        DieselUlid::from_string(&raw.sender_id).map_err(|_| (ValidationError::InvalidSenderId(raw.sender_id.clone()), Some(auto_message_id)))?;

    let receiver_id =
        DieselUlid::from_string(&raw.receiver_id).map_err(|_| (ValidationError::InvalidReceiverId(raw.receiver_id.clone()), Some(auto_message_id)))?;

    let trimmed = raw.content.trim().to_string();
    let len = trimmed.chars().count();
    if len == 0 || len > max_len {
        return Err((ValidationError::ContentOutOfRange { len, max: max_len }, Some(auto_message_id)));
    }

    if sender_id == receiver_id {
        return Err((ValidationError::SelfDirected, Some(auto_message_id)));
    }

    Ok(Envelope {
        envelope_type: ENVELOPE_TYPE.to_string(),
        auto_message_id,
        sender_id,
        receiver_id,
        content: trimmed,
        original_send_date: raw.original_send_date,
        queued_at: raw.queued_at,
    })
}

enum ProcessOutcome {
    Processed(DieselUlid),
}

enum ProcessFailure {
    /// Envelope payload itself was not JSON — always dead-lettered,
    /// never retried (spec §4.5 step 1).
    ParseFailed,
    /// Validation failures never retry (spec §7 ValidationError).
    NonRetryable { auto_message_id: Option<DieselUlid>, error_code: String },
    /// Missing/inactive users or transient infra failures retry up to
    /// the configured max (spec §7 NotFoundError / TransientInfraError).
    Retryable { envelope: Box<Envelope>, error_code: String },
}

pub struct ConsumerWorker<U, P, C, M, B>
where
    U: UserStore + 'static,
    P: PlannedMessageStore + 'static,
    C: ConversationStore + 'static,
    M: MessageStore + 'static,
    B: PresenceBackend + 'static,
{
    users: Arc<U>,
    planned_messages: Arc<P>,
    conversations: Arc<C>,
    messages: Arc<M>,
    broker: Arc<dyn Broker>,
    presence: Arc<PresenceIndex<B>>,
    realtime: Arc<dyn RealtimeBus>,
    config: ConsumerConfig,
    concurrency: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<StatsInner>>,
    events: broadcast::Sender<ConsumerEvent>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<U, P, C, M, B> ConsumerWorker<U, P, C, M, B>
where
    U: UserStore + 'static,
    P: PlannedMessageStore + 'static,
    C: ConversationStore + 'static,
    M: MessageStore + 'static,
    B: PresenceBackend + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<U>,
        planned_messages: Arc<P>,
        conversations: Arc<C>,
        messages: Arc<M>,
        broker: Arc<dyn Broker>,
        presence: Arc<PresenceIndex<B>>,
        realtime: Arc<dyn RealtimeBus>,
        config: ConsumerConfig,
        prefetch: u16,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            users,
            planned_messages,
            conversations,
            messages,
            broker,
            presence,
            realtime,
            config,
            concurrency: Arc::new(Semaphore::new(prefetch.max(1) as usize)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(StatsInner::default())),
            events,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsumerEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn get_stats(&self) -> ConsumerStats {
        let stats = self.stats.read().await;
        ConsumerStats {
            is_running: self.is_running(),
            total_processed: stats.total_processed,
            total_successful: stats.total_successful,
            total_failed: stats.total_failed,
            last_processed_at: stats.last_processed_at,
            average_processing_time: stats.average_processing_time(),
        }
    }

    pub async fn reset_stats(&self) {
        *self.stats.write().await = StatsInner::default();
    }
}

impl<U, P, C, M, B> ConsumerWorker<U, P, C, M, B>
where
    U: UserStore + Send + Sync + 'static,
    P: PlannedMessageStore + Send + Sync + 'static,
    C: ConversationStore + Send + Sync + 'static,
    M: MessageStore + Send + Sync + 'static,
    B: PresenceBackend + Send + Sync + 'static,
{
    pub async fn start(self: &Arc<Self>) -> Result<(), crate::app::errors::BrokerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !self.broker.is_connection_active().await {
            self.broker.connect().await?;
        }
        let mut receiver = self.broker.consume().await?;

        let _ = self.events.send(ConsumerEvent::ConsumerStarted);
        info!("consumer started");

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker.shutdown.cancelled() => break,
                    maybe_delivery = receiver.recv() => {
                        match maybe_delivery {
                            Some(delivery) => {
                                let worker = Arc::clone(&worker);
                                let permit = Arc::clone(&worker.concurrency).acquire_owned().await.ok();
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    worker.process_delivery(delivery).await;
                                });
                            }
                            None => break,
                        }
                    }
                }
            }

            worker.running.store(false, Ordering::SeqCst);
            let _ = worker.events.send(ConsumerEvent::ConsumerStopped);
            info!("consumer stopped");
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn process_delivery(&self, delivery: Delivery) {
        let started = Instant::now();
        let retry_count = delivery.retry_count;

        match self.try_process(&delivery.payload).await {
            Ok(ProcessOutcome::Processed(auto_message_id)) => {
                let _ = delivery.acker.ack().await;
                self.stats.write().await.record_success(started.elapsed());
                let _ = self.events.send(ConsumerEvent::MessageProcessed { auto_message_id });
            }
            Err(ProcessFailure::ParseFailed) => {
                let _ = delivery.acker.nack(false).await;
                self.stats.write().await.record_failure();
                let _ = self.events.send(ConsumerEvent::MessageFailed {
                    auto_message_id: None,
                    error_code: ValidationError::MalformedPayload.error_code().to_string(),
                });
            }
            Err(ProcessFailure::NonRetryable { auto_message_id, error_code }) => {
                let _ = delivery.acker.nack(false).await;
                self.stats.write().await.record_failure();
                let _ = self.events.send(ConsumerEvent::MessageFailed { auto_message_id, error_code });
            }
            Err(ProcessFailure::Retryable { envelope, error_code }) => {
                if retry_count < self.config.max_retries as u32 {
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    match self.broker.send_to_queue(&envelope, retry_count + 1).await {
                        Ok(()) => {
                            // republished; original frame is done with.
                            let _ = delivery.acker.ack().await;
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to republish for retry, dead-lettering");
                            let _ = delivery.acker.nack(false).await;
                            self.stats.write().await.record_failure();
                            let _ = self.events.send(ConsumerEvent::MessageFailed {
                                auto_message_id: Some(envelope.auto_message_id),
                                error_code,
                            });
                        }
                    }
                } else {
                    let _ = delivery.acker.nack(false).await;
                    self.stats.write().await.record_failure();
                    let _ = self.events.send(ConsumerEvent::MessageFailed {
                        auto_message_id: Some(envelope.auto_message_id),
                        error_code,
                    });
                }
            }
        }
    }

    async fn try_process(&self, payload: &[u8]) -> Result<ProcessOutcome, ProcessFailure> {
        let raw: RawEnvelope = serde_json::from_slice(payload).map_err(|_| ProcessFailure::ParseFailed)?;
        let envelope = validate_queue_message(raw, self.config.content_max_len).map_err(|(e, auto_message_id)| ProcessFailure::NonRetryable {
            auto_message_id,
            error_code: e.error_code().to_string(),
        })?;

        let retryable = |error_code: &str| ProcessFailure::Retryable {
            envelope: Box::new(envelope.clone()),
            error_code: error_code.to_string(),
        };

        let sender = self
            .users
            .find_by_id(envelope.sender_id)
            .await
            .map_err(|_| retryable("TRANSIENT_INFRA_ERROR"))?
            .ok_or_else(|| retryable("SENDER_NOT_FOUND"))?;
        if !sender.is_active {
            return Err(retryable("SENDER_INACTIVE"));
        }

        let receiver = self
            .users
            .find_by_id(envelope.receiver_id)
            .await
            .map_err(|_| retryable("TRANSIENT_INFRA_ERROR"))?
            .ok_or_else(|| retryable("RECEIVER_NOT_FOUND"))?;
        if !receiver.is_active {
            return Err(retryable("RECEIVER_INACTIVE"));
        }

        // Duplicate-delivery guard (spec §9, mandatory): if this planned
        // message has already been marked sent, this is a redelivery of
        // an envelope whose prior attempt already succeeded. Short-circuit
        // without creating a second ChatMessage.
        if let Ok(Some(planned)) = self.planned_messages.find_by_id(envelope.auto_message_id).await {
            if planned.is_sent {
                return Ok(ProcessOutcome::Processed(envelope.auto_message_id));
            }
        }

        let conversation = match self
            .conversations
            .find_between_users(envelope.sender_id, envelope.receiver_id)
            .await
            .map_err(|_| retryable("TRANSIENT_INFRA_ERROR"))?
        {
            Some(c) => c,
            None => self
                .conversations
                .create(envelope.sender_id, envelope.receiver_id)
                .await
                .map_err(|_| retryable("TRANSIENT_INFRA_ERROR"))?,
        };

        let chat_message = self
            .messages
            .create(NewChatMessage::new(conversation.id, envelope.sender_id, envelope.content.clone()))
            .await
            .map_err(|_| retryable("TRANSIENT_INFRA_ERROR"))?;

        if let Err(e) = self
            .conversations
            .update_last_message(conversation.id, &envelope.content, envelope.sender_id, chat_message.created_at)
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "failed to update conversation summary, continuing");
        }

        match self.planned_messages.mark_sent(envelope.auto_message_id).await {
            Ok(false) => warn!(auto_message_id = %envelope.auto_message_id, "planned message missing during mark-sent, continuing"),
            Err(e) => warn!(auto_message_id = %envelope.auto_message_id, error = %e, "failed to mark planned message sent, continuing"),
            Ok(true) => {}
        }

        if matches!(self.presence.is_user_online(envelope.receiver_id).await, Ok(true)) {
            let payload = NotificationPayload {
                message_id: chat_message.id,
                conversation_id: conversation.id,
                sender_id: envelope.sender_id,
                sender_info: NotificationSenderInfo {
                    id: sender.id,
                    username: sender.username.clone(),
                    email: sender.email.clone(),
                },
                content: envelope.content.clone(),
                created_at: chat_message.created_at,
                is_auto_message: true,
            };

            if let Err(e) = self.realtime.publish_to_user(envelope.receiver_id, MESSAGE_RECEIVED_EVENT, &payload).await {
                warn!(receiver_id = %envelope.receiver_id, error = %e, "realtime notification failed, continuing");
            }
        }

        Ok(ProcessOutcome::Processed(envelope.auto_message_id))
    }
}
