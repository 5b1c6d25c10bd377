use anyhow::Result;
use std::sync::Arc;

use crate::app::planner::Planner;
use crate::app::stores::postgres::{PgPlannedMessageStore, PgUserStore};
use crate::{config::Config, database};

pub async fn handle_plan_command() -> Result<()> {
    let config = Config::load()?;
    let pool = database::create_pool(&config)?;

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let planned_messages = Arc::new(PgPlannedMessageStore::new(pool));

    let planner = Planner::new(users, planned_messages);
    let created = planner.plan_automatic_messages().await?;

    println!("Planned {created} automatic message(s)");
    Ok(())
}
