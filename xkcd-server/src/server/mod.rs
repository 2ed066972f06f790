pub mod app;
pub mod error;
pub mod handlers;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

use anyhow::Result;
use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;
use tokio::sync::watch;
use tracing::info;

use xkcd::config::DatabaseSettings;
use xkcd::database::{connection::establish_connection, migrations::Migrator};
use xkcd::{AppContext, Settings};

/// Connects to the main database and, when configured separately, the broker database.
pub async fn connect(settings: &Settings) -> Result<(DatabaseConnection, DatabaseConnection)> {
    let db = establish_connection(&settings.database).await?;
    Migrator::up(&db, None).await?;

    let broker_db = match &settings.broker.url {
        Some(url) if url != &settings.database.url => {
            let broker_settings = DatabaseSettings {
                url: url.clone(),
                ..settings.database.clone()
            };
            let broker_db = establish_connection(&broker_settings).await?;
            Migrator::up(&broker_db, None).await?;
            broker_db
        }
        _ => db.clone(),
    };
    info!("Database migrations completed");

    Ok((db, broker_db))
}

pub async fn start_server(settings: Settings) -> Result<()> {
    let (db, broker_db) = connect(&settings).await?;
    let port = settings.server.port;
    let cors_origin = settings.server.cors_origin.clone();

    let ctx = AppContext::new(db, broker_db, settings, reqwest::Client::new());
    let app = app::create_app(ctx.clone(), cors_origin.as_deref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = app::spawn_background_tasks(&ctx, shutdown_rx);

    log_routes();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for task in background {
        let _ = task.await;
    }
    info!("Server stopped");

    Ok(())
}

fn log_routes() {
    info!("API Endpoints:");
    info!("  /health                     - Health check");
    info!("  /api/v1/images/*            - Image upload and remote download");
    info!("  /api/v1/comics/*            - Comics and their translations");
    info!("  /api/v1/translations/*      - Translation lifecycle");
}

pub async fn migrate_database(settings: &Settings, direction: MigrateDirection) -> Result<()> {
    let db = establish_connection(&settings.database).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
