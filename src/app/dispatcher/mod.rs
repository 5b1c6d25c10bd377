//! Scheduled scanner moving due planned messages onto the broker in
//! bounded batches. See spec §4.3.
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

use crate::app::broker::{Broker, Envelope};
use crate::app::errors::DispatchError;
use crate::app::models::DieselUlid;
use crate::app::stores::PlannedMessageStore;

pub const BATCH_SIZE: usize = 50;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub queued: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub struct Dispatcher<P: PlannedMessageStore> {
    planned_messages: Arc<P>,
    broker: Arc<dyn Broker>,
    batch_size: usize,
}

impl<P: PlannedMessageStore> Dispatcher<P> {
    pub fn new(planned_messages: Arc<P>, broker: Arc<dyn Broker>) -> Self {
        Self {
            planned_messages,
            broker,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn process_pending_messages(&self) -> Result<DispatchReport, DispatchError> {
        let now = Utc::now();
        let due = self
            .planned_messages
            .find_due(now)
            .await
            .map_err(|e| DispatchError::QueueProcessingError(e.to_string()))?;

        let mut report = DispatchReport {
            processed: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(report);
        }

        if !self.broker.is_connection_active().await {
            self.broker.connect().await.map_err(|e| DispatchError::QueueProcessingError(e.to_string()))?;
        }

        for batch in due.chunks(self.batch_size) {
            // Success-mask so markAsQueued only touches ids that actually
            // published, regardless of which ones in the batch failed.
            let mut published_ids: Vec<DieselUlid> = Vec::with_capacity(batch.len());

            for message in batch {
                let envelope = Envelope::new(message.id, message.sender_id, message.receiver_id, message.content.clone(), message.send_date);

                match self.broker.send_to_queue(&envelope, 0).await {
                    Ok(()) => {
                        report.queued += 1;
                        published_ids.push(message.id);
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{}: {}", message.id, e));
                        warn!(auto_message_id = %message.id, error = %e, "failed to publish planned message");
                    }
                }
            }

            if !published_ids.is_empty() {
                if let Err(e) = self.planned_messages.mark_queued(&published_ids).await {
                    error!(error = %e, "failed to mark batch as queued after successful publish");
                    return Err(DispatchError::QueueProcessingError(e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
