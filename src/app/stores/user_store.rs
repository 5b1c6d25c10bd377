use async_trait::async_trait;

use crate::app::errors::StoreError;
use crate::app::models::user::{ActiveUser, NewUser, User};
use crate::app::models::DieselUlid;

/// The Document Store's user-facing surface that the pipeline depends on.
/// Everything else about users (profile editing, password reset, …) is
/// out of scope per spec §1.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_active_users(&self) -> Result<Vec<ActiveUser>, StoreError>;
    async fn find_by_id(&self, id: DieselUlid) -> Result<Option<User>, StoreError>;
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;
}
