//! Online-user set and per-user TTL'd metadata (spec §4.6), mirroring
//! the `Cache` driver split in `crate::cache`: one trait, a Redis
//! backend for production and an in-memory backend for tests.
pub mod drivers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app::errors::PresenceError;
use crate::app::models::DieselUlid;

pub use drivers::memory::MemoryPresenceBackend;
pub use drivers::redis::RedisPresenceBackend;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    #[serde(rename = "userId")]
    pub user_id: DieselUlid,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// Set-membership + keyed-metadata contract the presence backend needs.
/// Deliberately narrower than `Cache`: presence only ever needs a set
/// and per-member TTL'd values, never arbitrary cache keys.
#[async_trait]
pub trait PresenceBackend: Send + Sync {
    async fn add_online(&self, user_id: DieselUlid) -> Result<(), PresenceError>;
    async fn remove_online(&self, user_id: DieselUlid) -> Result<(), PresenceError>;
    async fn is_online(&self, user_id: DieselUlid) -> Result<bool, PresenceError>;
    async fn online_members(&self) -> Result<Vec<DieselUlid>, PresenceError>;
    async fn put_info(&self, user_id: DieselUlid, info: &UserInfo, ttl: Duration) -> Result<(), PresenceError>;
    async fn get_info(&self, user_id: DieselUlid) -> Result<Option<UserInfo>, PresenceError>;
    async fn remove_info(&self, user_id: DieselUlid) -> Result<(), PresenceError>;
    async fn clear(&self) -> Result<(), PresenceError>;
}

/// Wraps a `PresenceBackend` with exactly the operations spec.md §4.6
/// names, so callers never touch set/key primitives directly.
pub struct PresenceIndex<B: PresenceBackend> {
    backend: B,
    ttl: Duration,
}

impl<B: PresenceBackend> PresenceIndex<B> {
    pub fn new(backend: B, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub async fn set_user_online(&self, user_id: DieselUlid, username: &str) -> Result<(), PresenceError> {
        self.backend.add_online(user_id).await?;
        let info = UserInfo {
            user_id,
            username: username.to_string(),
            timestamp: Utc::now(),
        };
        self.backend.put_info(user_id, &info, self.ttl).await
    }

    pub async fn set_user_offline(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        self.backend.remove_online(user_id).await?;
        self.backend.remove_info(user_id).await
    }

    pub async fn is_user_online(&self, user_id: DieselUlid) -> Result<bool, PresenceError> {
        self.backend.is_online(user_id).await
    }

    pub async fn get_online_users(&self) -> Result<Vec<DieselUlid>, PresenceError> {
        self.backend.online_members().await
    }

    pub async fn get_online_user_count(&self) -> Result<usize, PresenceError> {
        Ok(self.backend.online_members().await?.len())
    }

    pub async fn get_user_info(&self, user_id: DieselUlid) -> Result<Option<UserInfo>, PresenceError> {
        self.backend.get_info(user_id).await
    }

    pub async fn get_online_users_with_info(&self) -> Result<Vec<UserInfo>, PresenceError> {
        let mut infos = Vec::new();
        for user_id in self.backend.online_members().await? {
            if let Some(info) = self.backend.get_info(user_id).await? {
                infos.push(info);
            }
        }
        Ok(infos)
    }

    /// Drops set members whose `user_info` key has already expired —
    /// needed because a backend's set membership and keyed TTL can
    /// drift apart (the key vanishes, the set entry does not).
    pub async fn cleanup_expired_users(&self) -> Result<usize, PresenceError> {
        let mut removed = 0;
        for user_id in self.backend.online_members().await? {
            if self.backend.get_info(user_id).await?.is_none() {
                self.backend.remove_online(user_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn clear_all_online_users(&self) -> Result<(), PresenceError> {
        self.backend.clear().await
    }
}
