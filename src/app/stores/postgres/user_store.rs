use async_trait::async_trait;
use diesel::prelude::*;

use super::blocking;
use crate::app::errors::StoreError;
use crate::app::models::user::{ActiveUser, NewUser, User};
use crate::app::models::DieselUlid;
use crate::app::stores::UserStore;
use crate::database::DbPool;
use crate::schema::users::dsl;

#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_active_users(&self) -> Result<Vec<ActiveUser>, StoreError> {
        blocking(self.pool.clone(), |conn| {
            let rows: Vec<User> = dsl::users.filter(dsl::is_active.eq(true)).load(conn)?;
            Ok(rows
                .into_iter()
                .map(|u| ActiveUser {
                    id: u.id,
                    username: u.username,
                    email: u.email,
                })
                .collect())
        })
        .await
    }

    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<User>, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            Ok(dsl::users.filter(dsl::id.eq(id)).first::<User>(conn).optional()?)
        })
        .await
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        blocking(self.pool.clone(), move |conn| {
            diesel::insert_into(dsl::users).values(&new_user).execute(conn)?;
            Ok(dsl::users.filter(dsl::id.eq(new_user.id)).first::<User>(conn)?)
        })
        .await
    }
}
