use async_trait::async_trait;

use crate::app::errors::StoreError;
use crate::app::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage, Page};
use crate::app::models::DieselUlid;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, new_message: NewChatMessage) -> Result<ChatMessage, StoreError>;

    /// Sorted by `created_at` descending, paginated by `(page-1)*limit`
    /// skip and `limit`, sender fields populated. See spec §4.7.
    async fn find_by_conversation_id(
        &self,
        conversation_id: DieselUlid,
        page: i64,
        limit: i64,
    ) -> Result<Page<ChatMessageWithSender>, StoreError>;
}
