use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::DieselUlid;
use crate::schema::messages;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, AsChangeset)]
#[diesel(table_name = messages)]
#[diesel(primary_key(id))]
pub struct ChatMessage {
    pub id: DieselUlid,
    pub conversation_id: DieselUlid,
    pub sender_id: DieselUlid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = messages)]
pub struct NewChatMessage {
    pub id: DieselUlid,
    pub conversation_id: DieselUlid,
    pub sender_id: DieselUlid,
    pub content: String,
    pub is_read: bool,
}

impl NewChatMessage {
    pub fn new(conversation_id: DieselUlid, sender_id: DieselUlid, content: String) -> Self {
        Self {
            id: DieselUlid::new(),
            conversation_id,
            sender_id,
            content,
            is_read: false,
        }
    }
}

/// Sender fields populated alongside a `ChatMessage` for downstream
/// consumers (realtime payload, paginated history). See spec §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: DieselUlid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageWithSender {
    pub message: ChatMessage,
    pub sender: SenderInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
