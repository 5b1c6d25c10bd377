use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::server;

pub async fn handle_serve_command(host: String, port: Option<u16>) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "autopair=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Starting autopaird...");
    server::run(Some(host), port).await
}
