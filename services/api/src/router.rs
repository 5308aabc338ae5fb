//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the observer WebSocket endpoint, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        BorrowerRejection, ConversationMessage, DispatchCallPayload, DispatchFailureResponse,
        ErrorResponse, IngestResponse, SessionSummary,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::dispatch_call,
        handlers::ingest_borrowers,
        handlers::list_sessions,
        handlers::get_session,
        handlers::get_conversations,
    ),
    components(
        schemas(SessionSummary, DispatchCallPayload, DispatchFailureResponse, IngestResponse, BorrowerRejection, ConversationMessage, ErrorResponse)
    ),
    tags(
        (name = "Dialer API", description = "Outbound collection call dispatch")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/dispatch-call", post(handlers::dispatch_call))
        .route("/borrowers", post(handlers::ingest_borrowers))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{phone}", get(handlers::get_session))
        .route("/conversations/{phone}", get(handlers::get_conversations))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
