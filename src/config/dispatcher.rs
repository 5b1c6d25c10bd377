use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub cron: String,
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self> {
        Ok(DispatcherConfig {
            batch_size: env::var("DISPATCHER_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            cron: env::var("DISPATCHER_CRON").unwrap_or_else(|_| "* * * * *".to_string()),
        })
    }
}
