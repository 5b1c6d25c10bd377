use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::errors::StoreError;
use crate::app::models::conversation::Conversation;
use crate::app::models::DieselUlid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Order-independent lookup by participant pair. See spec §4.7.
    async fn find_between_users(&self, a: DieselUlid, b: DieselUlid) -> Result<Option<Conversation>, StoreError>;

    /// Rejects `a == b`. Implementations must tolerate a concurrent
    /// duplicate create racing on the same pair (spec §9) by resolving
    /// the unique-key conflict with a retried find.
    async fn create(&self, a: DieselUlid, b: DieselUlid) -> Result<Conversation, StoreError>;

    async fn update_last_message(
        &self,
        conversation_id: DieselUlid,
        content: &str,
        sender_id: DieselUlid,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<Conversation>, StoreError>;
}
