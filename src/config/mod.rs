use anyhow::Result;
use dotenv::dotenv;
use std::env;
use std::path::Path;

pub mod app;
pub mod broker;
pub mod consumer;
pub mod database;
pub mod dispatcher;
pub mod presence;
pub mod scheduler;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: app::AppConfig,
    pub database: database::DatabaseConfig,
    pub broker: broker::BrokerConfig,
    pub presence: presence::PresenceConfig,
    pub scheduler: scheduler::SchedulerConfig,
    pub dispatcher: dispatcher::DispatcherConfig,
    pub consumer: consumer::ConsumerConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_dotenv();

        Ok(Config {
            app: app::AppConfig::from_env()?,
            database: database::DatabaseConfig::from_env()?,
            broker: broker::BrokerConfig::from_env()?,
            presence: presence::PresenceConfig::from_env()?,
            scheduler: scheduler::SchedulerConfig::from_env()?,
            dispatcher: dispatcher::DispatcherConfig::from_env()?,
            consumer: consumer::ConsumerConfig::from_env()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::load()
    }

    fn load_dotenv() {
        let env_file = match env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()).as_str() {
            "production" => ".env.production",
            "staging" => ".env.staging",
            "testing" => ".env.testing",
            _ => ".env",
        };

        if Path::new(env_file).exists() {
            dotenv::from_filename(env_file).ok();
        } else {
            dotenv().ok();
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    pub fn is_production(&self) -> bool {
        self.app.is_production()
    }
}
