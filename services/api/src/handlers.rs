//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for dispatching
//! calls and inspecting sessions. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use dialer_core::{BorrowerRecord, DispatchError, ObserverEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{
        BorrowerRejection, ConversationMessage, ConversationQuery, DispatchCallPayload,
        DispatchFailureResponse, ErrorResponse, IngestResponse, SessionSummary,
    },
    state::AppState,
};

const DEFAULT_CONVERSATION_LIMIT: i64 = 5;
const MAX_CONVERSATION_LIMIT: i64 = 100;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    BadGateway {
        message: String,
        session: SessionSummary,
    },
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::ServiceUnavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::BadGateway { message, session } => {
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(DispatchFailureResponse { message, session }),
                )
                    .into_response();
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::InvalidInput(_) => ApiError::BadRequest(message),
            DispatchError::AlreadyInProgress { .. } => ApiError::Conflict(message),
            DispatchError::Declined { .. } => ApiError::Unprocessable(message),
            DispatchError::ProviderFailure { session, .. } => ApiError::BadGateway {
                message,
                session: SessionSummary::from(*session),
            },
            DispatchError::Configuration(_) => {
                ApiError::InternalServerError(anyhow::anyhow!(message))
            }
        }
    }
}

/// Dispatch a voice call to a single borrower and wait for the outcome.
#[utoipa::path(
    post,
    path = "/dispatch-call",
    request_body = DispatchCallPayload,
    responses(
        (status = 200, description = "Agent dispatched", body = SessionSummary),
        (status = 400, description = "Invalid borrower data", body = ErrorResponse),
        (status = 409, description = "A call to this phone is already in progress", body = ErrorResponse),
        (status = 422, description = "Borrower prefers a channel other than voice", body = ErrorResponse),
        (status = 502, description = "The call provider failed", body = DispatchFailureResponse)
    )
)]
pub async fn dispatch_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchCallPayload>,
) -> Result<Json<SessionSummary>, ApiError> {
    let record = payload
        .into_record()
        .map_err(|e| ApiError::from(DispatchError::from(e)))?;
    let session = state.orchestrator.start_dispatch(record).await?;
    Ok(Json(session.into()))
}

/// Canonicalize a batch of borrower rows and publish the valid ones to observers.
#[utoipa::path(
    post,
    path = "/borrowers",
    request_body(content = Vec<serde_json::Value>, description = "Loose borrower rows"),
    responses(
        (status = 200, description = "Rows accepted and rejected", body = IngestResponse)
    )
)]
pub async fn ingest_borrowers(
    State(state): State<Arc<AppState>>,
    Json(rows): Json<Vec<Value>>,
) -> Json<IngestResponse> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        match BorrowerRecord::from_value(row) {
            Ok(record) => accepted.push(record),
            Err(e) => rejected.push(BorrowerRejection {
                index,
                reason: e.to_string(),
            }),
        }
    }

    if rejected.is_empty() {
        info!(accepted = accepted.len(), "Borrowers ingested");
    } else {
        warn!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            "Borrowers ingested with rejections"
        );
    }
    if !accepted.is_empty() {
        state.broadcaster.publish(ObserverEvent::BorrowersUpdate {
            borrowers: accepted.clone(),
        });
    }

    Json(IngestResponse { accepted, rejected })
}

/// List sessions that are still in flight.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Active sessions, oldest first", body = [SessionSummary])
    )
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    let sessions = state
        .orchestrator
        .registry()
        .list_active()
        .into_iter()
        .map(SessionSummary::from)
        .collect();
    Json(sessions)
}

/// Get the latest session for a phone, whether active or finished.
#[utoipa::path(
    get,
    path = "/sessions/{phone}",
    responses(
        (status = 200, description = "Session details", body = SessionSummary),
        (status = 404, description = "No session for this phone", body = ErrorResponse)
    ),
    params(
        ("phone" = String, Path, description = "Ten digit borrower phone")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let session = state
        .orchestrator
        .registry()
        .get(&phone)
        .ok_or_else(|| ApiError::NotFound(format!("No session for phone '{}'", phone)))?;
    Ok(Json(session.into()))
}

/// Recent conversation history for a phone.
#[utoipa::path(
    get,
    path = "/conversations/{phone}",
    responses(
        (status = 200, description = "Most recent entries, oldest first", body = [ConversationMessage]),
        (status = 503, description = "No database configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("phone" = String, Path, description = "Ten digit borrower phone"),
        ConversationQuery
    )
)]
pub async fn get_conversations(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<ConversationMessage>>, ApiError> {
    let db = state.db.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Conversation history requires a database".to_string())
    })?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONVERSATION_LIMIT)
        .clamp(1, MAX_CONVERSATION_LIMIT);
    let entries = db.recent_entries(&phone, limit).await?;
    Ok(Json(entries.into_iter().map(ConversationMessage::from).collect()))
}
