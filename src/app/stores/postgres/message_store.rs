use async_trait::async_trait;
use diesel::prelude::*;

use super::blocking;
use crate::app::errors::StoreError;
use crate::app::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage, Page, SenderInfo};
use crate::app::models::user::User;
use crate::app::models::DieselUlid;
use crate::app::stores::MessageStore;
use crate::database::DbPool;
use crate::schema::{messages, users};

#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, new_message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(diesel::insert_into(messages::table).values(&new_message).get_result::<ChatMessage>(conn)?)
        })
        .await
    }

    async fn find_by_conversation_id(
        &self,
        conversation_id: DieselUlid,
        page: i64,
        limit: i64,
    ) -> Result<Page<ChatMessageWithSender>, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            let page = page.max(1);
            let limit = limit.max(1);
            let offset = (page - 1) * limit;

            let total: i64 = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .count()
                .get_result(conn)?;

            let rows: Vec<ChatMessage> = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .order(messages::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            let mut items = Vec::with_capacity(rows.len());
            for message in rows {
                let sender: User = users::table.filter(users::id.eq(message.sender_id)).first(conn)?;
                items.push(ChatMessageWithSender {
                    sender: SenderInfo {
                        id: sender.id,
                        username: sender.username,
                        email: sender.email,
                    },
                    message,
                });
            }

            Ok(Page { items, total })
        })
        .await
    }
}
