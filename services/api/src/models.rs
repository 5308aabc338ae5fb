//! API and Database Models
//!
//! Request and response bodies for the REST surface, documented with `utoipa`,
//! plus the row type read back from the `conversation_log` table.

use chrono::{DateTime, Utc};
use dialer_core::{
    BorrowerError, BorrowerRecord, ConversationEntry, ConversationRole, DispatchSession,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Body of `POST /dispatch-call`.
#[derive(Deserialize, ToSchema, Debug)]
pub struct DispatchCallPayload {
    #[schema(example = "9876543210")]
    pub phone: String,
    /// Loose borrower fields; legacy spreadsheet column names are accepted.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub user_info: Map<String, Value>,
}

impl DispatchCallPayload {
    /// Merges `phone` into `user_info` and canonicalizes the result.
    ///
    /// A borrower without any channel preference is assumed to want a call.
    pub fn into_record(self) -> Result<BorrowerRecord, BorrowerError> {
        let mut fields = self.user_info;
        fields.insert("phone".to_string(), Value::String(self.phone));
        if !fields.contains_key("channel_preference") && !fields.contains_key("Channel_Preference")
        {
            fields.insert(
                "channel_preference".to_string(),
                Value::String("voice".to_string()),
            );
        }
        BorrowerRecord::from_fields(&fields)
    }
}

/// A dispatch session as exposed over HTTP.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionSummary {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub phone: String,
    pub room_name: String,
    #[schema(example = "ringing")]
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    pub error: Option<String>,
    pub provider_dispatch_id: Option<String>,
}

impl From<DispatchSession> for SessionSummary {
    fn from(session: DispatchSession) -> Self {
        Self {
            session_id: session.session_id,
            phone: session.phone,
            room_name: session.room_name,
            state: session.state.as_str().to_string(),
            created_at: session.created_at,
            last_transition_at: session.last_transition_at,
            error: session.error,
            provider_dispatch_id: session.provider_dispatch_id,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct BorrowerRejection {
    /// Position of the row in the submitted array.
    pub index: usize,
    pub reason: String,
}

/// Outcome of `POST /borrowers`.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct IngestResponse {
    #[schema(value_type = Vec<Object>)]
    pub accepted: Vec<BorrowerRecord>,
    pub rejected: Vec<BorrowerRejection>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ConversationMessage {
    pub phone: String,
    #[schema(example = "agent")]
    pub role: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationEntry> for ConversationMessage {
    fn from(entry: ConversationEntry) -> Self {
        Self {
            phone: entry.phone,
            role: entry.role.as_str().to_string(),
            message: entry.message,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct ConversationQuery {
    /// Number of most recent entries to return (default 5, at most 100).
    pub limit: Option<i64>,
}

/// A row of the `conversation_log` table.
#[derive(FromRow, Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub phone: String,
    pub role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for ConversationEntry {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(ConversationEntry {
            role: row.role.parse::<ConversationRole>()?,
            phone: row.phone,
            message: row.message,
            timestamp: row.created_at,
        })
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

/// Body of a 502 from `POST /dispatch-call`.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DispatchFailureResponse {
    pub message: String,
    pub session: SessionSummary,
}
