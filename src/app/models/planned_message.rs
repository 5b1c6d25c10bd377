use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::DieselUlid;
use crate::schema::auto_messages;

/// A scheduled automatic message. See spec §3 `PlannedMessage`.
///
/// Invariant enforced by the store, not by this type alone:
/// `is_sent => is_queued`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, AsChangeset)]
#[diesel(table_name = auto_messages)]
#[diesel(primary_key(id))]
pub struct PlannedMessage {
    pub id: DieselUlid,
    pub sender_id: DieselUlid,
    pub receiver_id: DieselUlid,
    pub content: String,
    pub send_date: DateTime<Utc>,
    pub is_queued: bool,
    pub is_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = auto_messages)]
pub struct NewPlannedMessage {
    pub id: DieselUlid,
    pub sender_id: DieselUlid,
    pub receiver_id: DieselUlid,
    pub content: String,
    pub send_date: DateTime<Utc>,
    pub is_queued: bool,
    pub is_sent: bool,
}

impl NewPlannedMessage {
    pub fn new(sender_id: DieselUlid, receiver_id: DieselUlid, content: String, send_date: DateTime<Utc>) -> Self {
        Self {
            id: DieselUlid::new(),
            sender_id,
            receiver_id,
            content,
            send_date,
            is_queued: false,
            is_sent: false,
        }
    }
}

impl PlannedMessage {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.send_date <= now && !self.is_queued && !self.is_sent
    }
}
