use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub redis_url: String,
    pub ttl_seconds: u64,
}

impl PresenceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(PresenceConfig {
            redis_url: env::var("PRESENCE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ttl_seconds: env::var("PRESENCE_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
        })
    }
}
