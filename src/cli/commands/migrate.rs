use anyhow::Result;

use crate::{config::Config, database};

pub fn handle_migrate_command() -> Result<()> {
    println!("Running database migrations...");

    let config = Config::load()?;
    let pool = database::create_pool(&config)?;
    database::run_migrations(&pool)?;

    println!("Migrations completed successfully");
    Ok(())
}
