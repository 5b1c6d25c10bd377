use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::DieselUlid;
use crate::schema::conversations;

/// Canonical key for an unordered pair of user ids, used as a unique
/// index so two concurrent consumers racing to create the same
/// conversation collide on a constraint instead of both succeeding.
/// See spec §9 "Conversation creation race".
pub fn participant_key(a: DieselUlid, b: DieselUlid) -> String {
    let (lo, hi) = order_pair(a, b);
    format!("{}:{}", lo, hi)
}

fn order_pair(a: DieselUlid, b: DieselUlid) -> (DieselUlid, DieselUlid) {
    if a.to_string() <= b.to_string() {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, AsChangeset)]
#[diesel(table_name = conversations)]
#[diesel(primary_key(id))]
pub struct Conversation {
    pub id: DieselUlid,
    pub participant_a: DieselUlid,
    pub participant_b: DieselUlid,
    pub participant_key: String,
    pub last_message_content: Option<String>,
    pub last_message_sender_id: Option<DieselUlid>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub id: DieselUlid,
    pub participant_a: DieselUlid,
    pub participant_b: DieselUlid,
    pub participant_key: String,
}

impl NewConversation {
    pub fn between(a: DieselUlid, b: DieselUlid) -> anyhow::Result<Self> {
        if a == b {
            anyhow::bail!("a conversation requires two distinct participants");
        }
        let (lo, hi) = order_pair(a, b);
        Ok(Self {
            id: DieselUlid::new(),
            participant_a: lo,
            participant_b: hi,
            participant_key: format!("{}:{}", lo, hi),
        })
    }
}

impl Conversation {
    pub fn participants(&self) -> [DieselUlid; 2] {
        [self.participant_a, self.participant_b]
    }

    pub fn includes(&self, user: DieselUlid) -> bool {
        self.participant_a == user || self.participant_b == user
    }

    /// Bundles the flattened `last_message_*` columns, or `None` if no
    /// message has been delivered into this conversation yet.
    pub fn last_message(&self) -> Option<LastMessageSummary> {
        Some(LastMessageSummary {
            content: self.last_message_content.clone()?,
            sender_id: self.last_message_sender_id?,
            timestamp: self.last_message_timestamp?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageSummary {
    pub content: String,
    pub sender_id: DieselUlid,
    pub timestamp: DateTime<Utc>,
}
