use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub timezone: String,
    pub planner_cron: String,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(SchedulerConfig {
            timezone: env::var("SCHEDULER_TIMEZONE").unwrap_or_else(|_| "Europe/Istanbul".to_string()),
            planner_cron: env::var("PLANNER_CRON").unwrap_or_else(|_| "0 2 * * *".to_string()),
        })
    }
}
