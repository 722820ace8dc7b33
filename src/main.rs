//! Sheet Completer - fills missing spreadsheet cells with language-model guesses.

mod classifier;
mod completion;
mod config;
mod error;
mod extract;
mod inference;
mod output_store;
mod prompt;
mod sheet_codec;
mod upload;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use completion::SheetCompleter;
use config::AppConfig;
use error::AppError;
use extract::ValueExtractor;
use output_store::OutputStore;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    completer: Arc<SheetCompleter>,
    outputs: OutputStore,
    public_base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sheet_completer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let backend = inference::from_config(&config.inference)?;
    info!(
        "Inference backend initialized: {} (model={}, url={})",
        backend.name(),
        config.inference.model,
        config.inference.url
    );

    let extractor = ValueExtractor::new(config.extraction_strategy)
        .context("Failed to compile extraction patterns")?;

    let outputs = OutputStore::open(&config.output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", config.output_dir))?;
    output_store::spawn_sweeper(outputs.clone(), config.output_ttl, sweep_interval(config.output_ttl));

    let state = AppState {
        completer: Arc::new(SheetCompleter::new(
            backend,
            Arc::new(extractor),
            config.numeric_fallback,
        )),
        outputs,
        public_base_url: config.public_base_url.clone(),
    };

    let app = router(
        state,
        config.max_upload_bytes,
        cors_layer(config.cors_origin.as_deref())?,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize, cors: CorsLayer) -> Router {
    let output_dir = state.outputs.dir().to_path_buf();
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload::upload))
        .nest_service("/uploads", ServeDir::new(output_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// A panicking handler answers 500 with the usual error body.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Internal(anyhow::anyhow!("Handler panicked: {}", detail)).into_response()
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    match origin {
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("Invalid CORS_ORIGIN: {}", origin))?;
            Ok(CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any))
        }
        None => Ok(CorsLayer::permissive()),
    }
}

/// Sweep a few times per retention window, at most once a minute.
fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 4).max(Duration::from_secs(60))
}
