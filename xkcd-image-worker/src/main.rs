use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sea_orm_migration::MigratorTrait;
use tokio::sync::watch;
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use xkcd::broker::SqlBroker;
use xkcd::config::DatabaseSettings;
use xkcd::database::{connection::establish_connection, migrations::Migrator};
use xkcd::storage::ImageFileStorage;
use xkcd::Settings;
use xkcd_image_worker::{ImageProcessor, ImageWorker};

#[derive(Parser)]
#[clap(author, version, about)]
struct WorkerArgs {
    #[clap(short, long)]
    log_level: Option<String>,
    /// TOML settings file shared with the server.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Consumer name recorded on claimed messages.
    #[clap(short, long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    setup_logging(&args.log_level);

    let settings = Settings::load(args.config.as_deref())?;
    let name = args.name.unwrap_or_else(|| settings.worker.name.clone());

    let broker_settings = DatabaseSettings {
        url: settings.broker_url().to_string(),
        ..settings.database.clone()
    };
    let db = establish_connection(&broker_settings).await?;
    Migrator::up(&db, None).await?;

    let broker = Arc::new(SqlBroker::new(db, settings.broker.max_deliveries));
    let processor = ImageProcessor::new(
        ImageFileStorage::new(settings.storage.root.clone()),
        settings.worker.thumbnail_size,
    );
    let worker = ImageWorker::new(
        broker,
        processor,
        name.clone(),
        settings.broker.lease(),
        settings.broker.poll_interval(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(worker = %name, "Starting image worker");
    worker.run_until(shutdown_rx).await;

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .init();
}
