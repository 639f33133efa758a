use broker::connect_consumer;
use db::PgStore;
use std::process;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use worker::handlers::SmtpMailer;
use worker::{ActionProcessor, HandlerRegistry, WorkerConfig};

use dotenvy::dotenv;

fn init_tracing(loki_url: Option<&str>) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::from_default_env();
    let fmt_layer = fmt::layer().with_target(false).with_line_number(true);

    let loki_layer = match loki_url {
        Some(url) => {
            let (loki_layer, loki_task) = tracing_loki::builder()
                .label("service", "pipeline-worker")?
                .extra_field("pid", format!("{}", process::id()))?
                .build_url(url.parse()?)?;

            tokio::spawn(loki_task);
            Some(loki_layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(loki_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = WorkerConfig::from_env()?;
    init_tracing(config.loki_url.as_deref())?;

    let store = Arc::new(PgStore::connect(&config.database_url, config.max_connections).await?);
    store.migrate().await?;

    let registry = HandlerRegistry::standard(
        store.clone(),
        Arc::new(SmtpMailer),
        config.webhook_timeout,
    )?;
    let processor = Arc::new(ActionProcessor::new(Arc::new(registry), store));
    let consumer = connect_consumer(&config.broker).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(error) = ctrl_c().await {
            error!("Failed to listen for shutdown signal: {error:?}");
        }
        info!("Shutting down");
        shutdown.cancel();
    });

    info!("Worker started with {} broker", config.broker.broker_type);
    consumer.consume(cancel, processor).await?;

    Ok(())
}
