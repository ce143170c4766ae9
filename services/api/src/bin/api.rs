//! services/api/src/bin/api.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use luna_api::{
    adapters::{OpenAiChatAdapter, SqliteKvAdapter},
    config::Config,
    error::ApiError,
    ticker::spawn_progress_ticker,
    web::{api_router, rest::ApiDoc, state::AppState},
};
use luna_core::{ChatModelService, KeyValueStore, MemoryStore, SystemClock};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Key-Value Store ---
    let store: Arc<dyn KeyValueStore> = if config.uses_memory_store() {
        warn!("Using the in-memory store; nothing will survive a restart.");
        Arc::new(MemoryStore::new())
    } else {
        info!("Connecting to database...");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        let adapter = SqliteKvAdapter::new(pool);
        info!("Running database migrations...");
        adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(adapter)
    };

    // --- 3. Initialize the Chat Model ---
    let chat_model: Option<Arc<dyn ChatModelService>> = match &config.gemini_api_key {
        Some(key) => {
            let openai_config = OpenAIConfig::new()
                .with_api_key(key)
                .with_api_base(&config.chat_api_base);
            Some(Arc::new(OpenAiChatAdapter::new(
                Client::with_config(openai_config),
                config.chat_model.clone(),
            )))
        }
        None => {
            warn!("GEMINI_API_KEY is not set. Chat replies are disabled.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        chat_model,
    ));

    let record = app_state.progress.lock().await.load().await;
    info!(
        "Progress loaded: {} points, {} day streak ({:?}).",
        record.points,
        record.streak,
        config.points_policy
    );
    let ticker = spawn_progress_ticker(
        app_state.progress.clone(),
        config.progress_tick,
        app_state.shutdown.clone(),
    );

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid CORS origin '{}': {}",
            config.cors_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router(app_state.clone()).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state.shutdown.clone()))
        .await?;

    app_state.shutdown.cancel();
    if let Err(e) = ticker.await {
        warn!("Progress ticker ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}

/// Resolves on Ctrl+C, cancelling every open chat session first.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
