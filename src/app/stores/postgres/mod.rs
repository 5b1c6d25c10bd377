pub mod conversation_store;
pub mod message_store;
pub mod planned_message_store;
pub mod user_store;

pub use conversation_store::PgConversationStore;
pub use message_store::PgMessageStore;
pub use planned_message_store::PgPlannedMessageStore;
pub use user_store::PgUserStore;

use crate::app::errors::StoreError;
use crate::database::DbPool;

/// Runs a blocking Diesel closure on the blocking thread pool, the
/// standard way to bridge Diesel's sync API into async handlers
/// (Diesel has no native async driver; this mirrors how the teacher's
/// `r2d2`-pooled `PgConnection` is used from async service methods).
pub(crate) async fn blocking<F, T>(pool: DbPool, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut diesel::pg::PgConnection) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Pool(format!("blocking task panicked: {}", e)))?
}
