use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::app::errors::PresenceError;
use crate::app::models::DieselUlid;
use crate::app::presence::{PresenceBackend, UserInfo};

struct Entry {
    info: UserInfo,
    expires_at: Instant,
}

#[derive(Default, Clone)]
pub struct MemoryPresenceBackend {
    online: Arc<RwLock<HashSet<DieselUlid>>>,
    info: Arc<RwLock<HashMap<DieselUlid, Entry>>>,
}

impl MemoryPresenceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceBackend for MemoryPresenceBackend {
    async fn add_online(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        self.online.write().await.insert(user_id);
        Ok(())
    }

    async fn remove_online(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        self.online.write().await.remove(&user_id);
        Ok(())
    }

    async fn is_online(&self, user_id: DieselUlid) -> Result<bool, PresenceError> {
        Ok(self.online.read().await.contains(&user_id))
    }

    async fn online_members(&self) -> Result<Vec<DieselUlid>, PresenceError> {
        Ok(self.online.read().await.iter().cloned().collect())
    }

    async fn put_info(&self, user_id: DieselUlid, info: &UserInfo, ttl: Duration) -> Result<(), PresenceError> {
        self.info.write().await.insert(
            user_id,
            Entry {
                info: info.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_info(&self, user_id: DieselUlid) -> Result<Option<UserInfo>, PresenceError> {
        let mut info = self.info.write().await;
        match info.get(&user_id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.info.clone())),
            Some(_) => {
                info.remove(&user_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove_info(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        self.info.write().await.remove(&user_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PresenceError> {
        self.online.write().await.clear();
        self.info.write().await.clear();
        Ok(())
    }
}
