use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::blocking;
use crate::app::errors::StoreError;
use crate::app::models::planned_message::{NewPlannedMessage, PlannedMessage};
use crate::app::models::DieselUlid;
use crate::app::stores::PlannedMessageStore;
use crate::database::DbPool;
use crate::schema::auto_messages::dsl;

#[derive(Clone)]
pub struct PgPlannedMessageStore {
    pool: DbPool,
}

impl PgPlannedMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlannedMessageStore for PgPlannedMessageStore {
    async fn bulk_insert(&self, items: Vec<NewPlannedMessage>) -> Result<usize, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(diesel::insert_into(dsl::auto_messages).values(&items).execute(conn)?)
        })
        .await
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PlannedMessage>, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(dsl::auto_messages
                .filter(dsl::send_date.le(now))
                .filter(dsl::is_queued.eq(false))
                .filter(dsl::is_sent.eq(false))
                .order(dsl::send_date.asc())
                .load::<PlannedMessage>(conn)?)
        })
        .await
    }

    async fn mark_queued(&self, ids: &[DieselUlid]) -> Result<usize, StoreError> {
        let ids = ids.to_vec();
        blocking(self.pool.clone(), move |conn| {
            Ok(diesel::update(dsl::auto_messages.filter(dsl::id.eq_any(ids)))
                .set(dsl::is_queued.eq(true))
                .execute(conn)?)
        })
        .await
    }

    async fn mark_sent(&self, id: DieselUlid) -> Result<bool, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            let updated = diesel::update(dsl::auto_messages.filter(dsl::id.eq(id)))
                .set(dsl::is_sent.eq(true))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<PlannedMessage>, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(dsl::auto_messages.filter(dsl::id.eq(id)).first::<PlannedMessage>(conn).optional()?)
        })
        .await
    }
}
