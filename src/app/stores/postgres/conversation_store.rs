use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::blocking;
use crate::app::errors::StoreError;
use crate::app::models::conversation::{participant_key, Conversation, NewConversation};
use crate::app::models::DieselUlid;
use crate::app::stores::ConversationStore;
use crate::database::DbPool;
use crate::schema::conversations::dsl;

#[derive(Clone)]
pub struct PgConversationStore {
    pool: DbPool,
}

impl PgConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_between_users(&self, a: DieselUlid, b: DieselUlid) -> Result<Option<Conversation>, StoreError> {
        let key = participant_key(a, b);
        blocking(self.pool.clone(), move |conn| {
            Ok(dsl::conversations
                .filter(dsl::participant_key.eq(key))
                .first::<Conversation>(conn)
                .optional()?)
        })
        .await
    }

    async fn create(&self, a: DieselUlid, b: DieselUlid) -> Result<Conversation, StoreError> {
        let new_conversation = NewConversation::between(a, b).map_err(|e| StoreError::Conflict(e.to_string()))?;
        let key = new_conversation.participant_key.clone();

        blocking(self.pool.clone(), move |conn| {
            let inserted = diesel::insert_into(dsl::conversations)
                .values(&new_conversation)
                .get_result::<Conversation>(conn);

            match inserted {
                Ok(conversation) => Ok(conversation),
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    // Lost the race to another consumer creating the same
                    // pair concurrently (spec §9). Converge on their row.
                    dsl::conversations
                        .filter(dsl::participant_key.eq(key))
                        .first::<Conversation>(conn)
                        .map_err(StoreError::from)
                }
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await
    }

    async fn update_last_message(
        &self,
        conversation_id: DieselUlid,
        content: &str,
        sender_id: DieselUlid,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let content = content.to_string();
        blocking(self.pool.clone(), move |conn| {
            diesel::update(dsl::conversations.filter(dsl::id.eq(conversation_id)))
                .set((
                    dsl::last_message_content.eq(content),
                    dsl::last_message_sender_id.eq(sender_id),
                    dsl::last_message_timestamp.eq(timestamp),
                    dsl::updated_at.eq(timestamp),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<Conversation>, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(dsl::conversations.filter(dsl::id.eq(id)).first::<Conversation>(conn).optional()?)
        })
        .await
    }
}
