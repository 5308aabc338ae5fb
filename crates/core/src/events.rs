//! Events delivered to observers.
//!
//! Every event travels inside an [`ObserverEvent`] envelope which serializes
//! to the dashboard wire shape `{"event": <name>, "data": {...}}`.

use crate::{
    borrower::BorrowerRecord,
    conversation::ConversationEntry,
    session::{DispatchSession, DispatchState},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A progress update for one dispatch session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub session_id: Uuid,
    pub phone: String,
    pub state: DispatchState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Snapshots the session's current state. The room name is only attached
    /// once room creation has been attempted.
    pub fn for_session(session: &DispatchSession, message: impl Into<String>) -> Self {
        let room_name = match session.state {
            DispatchState::Requested | DispatchState::Connecting => None,
            _ => Some(session.room_name.clone()),
        };
        Self {
            session_id: session.session_id,
            phone: session.phone.clone(),
            state: session.state,
            message: message.into(),
            room_name,
            timestamp: Utc::now(),
        }
    }
}

/// Campaign-level progress for a phone, as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStatus {
    pub phone: String,
    pub status: String,
}

impl CampaignStatus {
    pub fn running(phone: &str) -> Self {
        Self {
            phone: phone.to_string(),
            status: "Running".to_string(),
        }
    }

    pub fn failed(phone: &str, reason: Option<&str>) -> Self {
        let status = match reason {
            Some(reason) => format!("Failed: {reason}"),
            None => "Failed".to_string(),
        };
        Self {
            phone: phone.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ObserverEvent {
    BorrowersUpdate { borrowers: Vec<BorrowerRecord> },
    CallStatus(StatusEvent),
    CampaignStatus(CampaignStatus),
    ConversationUpdate(ConversationEntry),
}

impl ObserverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ObserverEvent::BorrowersUpdate { .. } => "borrowers_update",
            ObserverEvent::CallStatus(_) => "call_status",
            ObserverEvent::CampaignStatus(_) => "campaign_status",
            ObserverEvent::ConversationUpdate(_) => "conversation_update",
        }
    }
}
