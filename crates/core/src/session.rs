//! Dispatch sessions and their lifecycle states.

use crate::borrower::ProviderMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The lifecycle of a single dispatch attempt. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Requested,
    Connecting,
    RoomCreating,
    AgentDispatching,
    Ringing,
    Succeeded,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Succeeded | DispatchState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Every non-terminal state may fail; otherwise only the immediate
    /// successor in the chain is allowed.
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Requested, Connecting)
            | (Connecting, RoomCreating)
            | (RoomCreating, AgentDispatching)
            | (AgentDispatching, Ringing)
            | (Ringing, Succeeded) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchState::Requested => "requested",
            DispatchState::Connecting => "connecting",
            DispatchState::RoomCreating => "room_creating",
            DispatchState::AgentDispatching => "agent_dispatching",
            DispatchState::Ringing => "ringing",
            DispatchState::Succeeded => "succeeded",
            DispatchState::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the provider room name for a phone number.
pub fn room_name_for(phone: &str) -> String {
    format!("room-{phone}")
}

/// One end-to-end attempt to connect a borrower to a calling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSession {
    pub session_id: Uuid,
    pub phone: String,
    pub room_name: String,
    pub state: DispatchState,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    pub error: Option<String>,
    pub provider_dispatch_id: Option<String>,
    pub metadata: ProviderMetadata,
}

impl DispatchSession {
    /// Creates a session in the `Requested` state.
    pub fn new(phone: &str, metadata: ProviderMetadata) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            phone: phone.to_string(),
            room_name: room_name_for(phone),
            state: DispatchState::Requested,
            created_at: now,
            last_transition_at: now,
            error: None,
            provider_dispatch_id: None,
            metadata,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Moves the session forward. Illegal transitions leave it untouched.
    pub(crate) fn transition(&mut self, next: DispatchState) -> bool {
        let allowed = self.state.can_transition_to(next);
        debug_assert!(allowed, "illegal transition {} -> {}", self.state, next);
        if !allowed {
            return false;
        }
        self.state = next;
        self.last_transition_at = Utc::now();
        true
    }

    /// Marks the session failed. The stored error is never empty.
    pub(crate) fn fail(&mut self, message: &str) -> bool {
        let message = message.trim();
        self.error = Some(if message.is_empty() {
            "unknown provider error".to_string()
        } else {
            message.to_string()
        });
        self.transition(DispatchState::Failed)
    }
}
