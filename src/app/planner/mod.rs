//! Nightly pairing batch generator. See spec §4.2.
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

use crate::app::errors::PlannerError;
use crate::app::models::planned_message::NewPlannedMessage;
use crate::app::stores::{PlannedMessageStore, UserStore};

const TEMPLATES: [&str; 8] = [
    "Hey, just checking in — how's your day going?",
    "Thinking of you! Hope everything's well on your end.",
    "It's been a while, let's catch up soon!",
    "Hope you're having a great week so far.",
    "Just wanted to say hello and see how you're doing.",
    "Sending you a quick hello from the app!",
    "Hope things are going smoothly for you lately.",
    "A little reminder that someone's thinking of you today.",
];

pub struct Planner<U: UserStore, P: PlannedMessageStore> {
    users: Arc<U>,
    planned_messages: Arc<P>,
}

impl<U: UserStore, P: PlannedMessageStore> Planner<U, P> {
    pub fn new(users: Arc<U>, planned_messages: Arc<P>) -> Self {
        Self { users, planned_messages }
    }

    /// Fetches active users, pairs them via Fisher-Yates shuffle, and
    /// bulk-inserts one `PlannedMessage` per pair. Returns the number
    /// of messages actually persisted.
    pub async fn plan_automatic_messages(&self) -> Result<usize, PlannerError> {
        let mut active_users = self
            .users
            .find_active_users()
            .await
            .map_err(|e| PlannerError::UserRetrievalFailed(e.to_string()))?;

        if active_users.len() < 2 {
            return Ok(0);
        }

        active_users.shuffle(&mut OsRng);

        let mut new_items = Vec::with_capacity(active_users.len() / 2);
        let mut rng = OsRng;
        for pair in active_users.chunks_exact(2) {
            let sender = &pair[0];
            let receiver = &pair[1];
            let content = TEMPLATES.choose(&mut rng).expect("TEMPLATES is non-empty").to_string();
            let hours = rng.gen_range(1..=24);
            let minutes = rng.gen_range(0..=59);
            let send_date = Utc::now() + Duration::hours(hours) + Duration::minutes(minutes);

            new_items.push(NewPlannedMessage::new(sender.id, receiver.id, content, send_date));
        }

        let inserted = self
            .planned_messages
            .bulk_insert(new_items)
            .await
            .map_err(|e| PlannerError::AutoMessageSaveFailed(e.to_string()))?;

        info!(planned = inserted, "planner produced planned messages");
        Ok(inserted)
    }
}
