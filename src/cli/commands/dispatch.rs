use anyhow::Result;
use std::sync::Arc;

use crate::app::broker::{AmqpBroker, Broker};
use crate::app::dispatcher::Dispatcher;
use crate::app::stores::postgres::PgPlannedMessageStore;
use crate::{config::Config, database};

pub async fn handle_dispatch_command() -> Result<()> {
    let config = Config::load()?;
    let pool = database::create_pool(&config)?;

    let planned_messages = Arc::new(PgPlannedMessageStore::new(pool));

    let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(config.broker.clone()));
    broker.connect().await?;

    let dispatcher = Dispatcher::new(planned_messages, broker).with_batch_size(config.dispatcher.batch_size);
    let report = dispatcher.process_pending_messages().await?;

    println!("Dispatched: processed={} queued={} failed={}", report.processed, report.queued, report.failed);
    for err in &report.errors {
        println!("  error: {err}");
    }
    Ok(())
}
