//! Main Entrypoint for the Dialer API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Connecting the optional conversation database and running migrations.
//! 3. Building the LiveKit client and the dispatch orchestrator.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use dialer_api::{config::Config, db::Db, router::create_router, state::AppState};
use dialer_core::{
    ConversationLog, DispatchOrchestrator, EventBroadcaster, LiveKitClient, SessionRegistry,
    TracingConversationLog,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let db = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let db = Arc::new(Db::new(pool));
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Some(db)
        }
        None => {
            warn!("DATABASE_URL not set; conversation history will only be logged.");
            None
        }
    };
    let conversation_log: Arc<dyn ConversationLog> = match &db {
        Some(db) => db.clone(),
        None => Arc::new(TracingConversationLog),
    };

    // --- 4. Initialize Dispatch Services ---
    let provider = LiveKitClient::new(config.livekit.clone())
        .context("Invalid LiveKit configuration")?
        .with_request_timeout(config.dispatch.provider_timeout);
    let broadcaster = Arc::new(EventBroadcaster::new(config.observer_buffer));
    let orchestrator = DispatchOrchestrator::new(
        Arc::new(provider),
        Arc::new(SessionRegistry::new()),
        broadcaster.clone(),
        config.dispatch.clone(),
    )
    .with_conversation_log(conversation_log.clone());

    let app_state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        broadcaster,
        conversation_log,
        db,
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        livekit_url = %config.livekit.url,
        agent = %config.dispatch.agent_name,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
