use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use crate::app::errors::PresenceError;
use crate::app::models::DieselUlid;
use crate::app::presence::{PresenceBackend, UserInfo};

const ONLINE_USERS_KEY: &str = "ONLINE_USERS";

fn user_info_key(user_id: DieselUlid) -> String {
    format!("user_info:{}", user_id)
}

pub struct RedisPresenceBackend {
    connection: ConnectionManager,
}

impl RedisPresenceBackend {
    pub async fn new(url: &str) -> Result<Self, PresenceError> {
        let client = Client::open(url).map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl PresenceBackend for RedisPresenceBackend {
    async fn add_online(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        let mut conn = self.connection.clone();
        conn.sadd::<_, _, ()>(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(|e| PresenceError::Unreachable(e.to_string()))
    }

    async fn remove_online(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        let mut conn = self.connection.clone();
        conn.srem::<_, _, ()>(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(|e| PresenceError::Unreachable(e.to_string()))
    }

    async fn is_online(&self, user_id: DieselUlid) -> Result<bool, PresenceError> {
        let mut conn = self.connection.clone();
        conn.sismember(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(|e| PresenceError::Unreachable(e.to_string()))
    }

    async fn online_members(&self) -> Result<Vec<DieselUlid>, PresenceError> {
        let mut conn = self.connection.clone();
        let raw: Vec<String> = conn.smembers(ONLINE_USERS_KEY).await.map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        Ok(raw.into_iter().filter_map(|s| DieselUlid::from_string(&s).ok()).collect())
    }

    async fn put_info(&self, user_id: DieselUlid, info: &UserInfo, ttl: Duration) -> Result<(), PresenceError> {
        let mut conn = self.connection.clone();
        let serialized = serde_json::to_string(info).map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        conn.set_ex::<_, _, ()>(user_info_key(user_id), serialized, ttl.as_secs())
            .await
            .map_err(|e| PresenceError::Unreachable(e.to_string()))
    }

    async fn get_info(&self, user_id: DieselUlid) -> Result<Option<UserInfo>, PresenceError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(user_info_key(user_id)).await.map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        match raw {
            Some(json) => {
                let info = serde_json::from_str(&json).map_err(|e| PresenceError::Unreachable(e.to_string()))?;
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    async fn remove_info(&self, user_id: DieselUlid) -> Result<(), PresenceError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(user_info_key(user_id)).await.map_err(|e| PresenceError::Unreachable(e.to_string()))
    }

    async fn clear(&self) -> Result<(), PresenceError> {
        let members = self.online_members().await?;
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(ONLINE_USERS_KEY).await.map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        for user_id in members {
            conn.del::<_, ()>(user_info_key(user_id)).await.map_err(|e| PresenceError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }
}
