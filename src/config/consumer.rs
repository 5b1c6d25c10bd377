use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_retries: i32,
    pub retry_delay_ms: u64,
    pub content_max_len: usize,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(ConsumerConfig {
            max_retries: env::var("CONSUMER_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            retry_delay_ms: env::var("CONSUMER_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            content_max_len: env::var("MESSAGE_CONTENT_MAX")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        })
    }
}
