use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use anyhow::{anyhow, Result};
use tracing::{debug, error, info};

use xkcd::AppContext;

use super::handlers::{comics, fallback, health, images, translations};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
}

pub async fn create_app(ctx: AppContext, cors_origin: Option<&str>) -> Result<Router> {
    let body_limit = ctx.settings().storage.upload_max_size as usize + MULTIPART_OVERHEAD;
    let state = AppState { ctx };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>()
                .map_err(|e| anyhow!("Invalid CORS origin: {}", e))?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_v1_routes())
        .fallback(fallback::route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state);

    Ok(app)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Image routes
        .route("/images/upload", post(images::upload_image))
        .route("/images/download", post(images::download_image))

        // Comic routes
        .route("/comics", get(comics::list_comics).post(comics::create_comic))
        .route("/comics/latest-number", get(comics::latest_number))
        .route("/comics/by-number/:number", get(comics::get_comic_by_number))
        .route("/comics/by-slug/:slug", get(comics::get_comic_by_slug))
        .route(
            "/comics/:id",
            get(comics::get_comic)
                .put(comics::update_comic)
                .delete(comics::delete_comic),
        )

        // Translation routes
        .route(
            "/comics/:id/translations",
            get(translations::list_translations).post(translations::create_translation),
        )
        .route(
            "/comics/:id/translations/:language",
            get(translations::get_translation_by_language),
        )
        .route(
            "/translations/:id",
            get(translations::get_translation)
                .put(translations::update_translation)
                .delete(translations::delete_translation),
        )
        .route("/translations/:id/publish", post(translations::publish_translation))
        .route("/translations/:id/raw-transcript", get(translations::get_raw_transcript))
}

/// Starts the processed-image consumer and the broker retention sweep.
///
/// Both stop once `shutdown` flips to `true`.
pub fn spawn_background_tasks(
    ctx: &AppContext,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let consumer = ctx.processed_image_consumer();
    let consumer_shutdown = shutdown.clone();
    let consumer_task = tokio::spawn(async move { consumer.run_until(consumer_shutdown).await });

    let broker = ctx.broker();
    let retention = ctx.settings().broker.retention();
    let mut prune_shutdown = shutdown;
    let prune_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Running broker retention sweep");
                    match broker.prune(retention).await {
                        Ok(removed) if removed > 0 => info!(removed, "pruned settled broker messages"),
                        Ok(_) => {}
                        Err(e) => error!("Broker retention sweep failed: {}", e),
                    }
                }
                changed = prune_shutdown.changed() => {
                    if changed.is_err() || *prune_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    vec![consumer_task, prune_task]
}
