use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::errors::StoreError;
use crate::app::models::planned_message::{NewPlannedMessage, PlannedMessage};
use crate::app::models::DieselUlid;

#[async_trait]
pub trait PlannedMessageStore: Send + Sync {
    /// Bulk-insert, returning the number of rows actually persisted
    /// (spec §4.2 step 6 — partial-insert behavior is store-defined).
    async fn bulk_insert(&self, items: Vec<NewPlannedMessage>) -> Result<usize, StoreError>;

    /// `sendDate <= now && !is_queued && !is_sent`, ordered as the store
    /// naturally returns them (spec §4.3 step 1).
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PlannedMessage>, StoreError>;

    /// Mark exactly the given ids `is_queued = true`. Returns the number
    /// of rows actually updated.
    async fn mark_queued(&self, ids: &[DieselUlid]) -> Result<usize, StoreError>;

    /// Mark `is_sent = true`. Returns `Ok(false)` (not an error) if the
    /// planned message no longer exists — the consumer logs a warning and
    /// continues, per spec §4.5 step 6.
    async fn mark_sent(&self, id: DieselUlid) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<PlannedMessage>, StoreError>;
}
