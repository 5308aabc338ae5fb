//! Room/Agent Provider Client
//!
//! Abstraction over the external service that provisions call rooms and
//! attaches calling agents. A dispatch acquires one [`ProviderConnection`]
//! through [`RoomProvider::connect`], issues its calls on it and then closes
//! it, whatever the outcome.

pub mod livekit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use livekit::{LiveKitClient, LiveKitCredentials};

/// Parameters for provisioning a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRoomRequest {
    pub name: String,
    /// Seconds an empty room lives before the provider reclaims it.
    pub empty_timeout: u32,
    pub max_participants: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub sid: String,
    pub name: String,
}

/// Parameters for attaching an agent to an existing room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDispatchRequest {
    pub agent_name: String,
    pub room: String,
    /// Serialized JSON handed to the agent.
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentDispatch {
    pub id: String,
    #[serde(default)]
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("could not build provider request: {0}")]
    InvalidRequest(String),
    #[error("dispatch aborted: {0}")]
    Aborted(String),
}

impl ProviderError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout(_) | ProviderError::Transport(_) => true,
            ProviderError::Rejected { status, .. } => *status >= 500 || *status == 429,
            ProviderError::InvalidResponse(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::Aborted(_) => false,
        }
    }

    /// The provider's own text for the failure, without the classification
    /// prefix `Display` adds. Timeouts carry no provider text.
    pub fn message(&self) -> String {
        match self {
            ProviderError::Timeout(_) => self.to_string(),
            ProviderError::Rejected { message, .. } => message.clone(),
            ProviderError::Transport(message)
            | ProviderError::InvalidResponse(message)
            | ProviderError::InvalidRequest(message)
            | ProviderError::Aborted(message) => message.clone(),
        }
    }
}

/// Factory for provider connections.
#[async_trait]
pub trait RoomProvider: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ProviderConnection>, ProviderError>;
}

/// One acquired provider connection. Callers must `close` it exactly once.
#[async_trait]
pub trait ProviderConnection: Send {
    async fn create_room(&mut self, request: &CreateRoomRequest) -> Result<Room, ProviderError>;

    async fn dispatch_agent(
        &mut self,
        request: &AgentDispatchRequest,
    ) -> Result<AgentDispatch, ProviderError>;

    async fn close(&mut self);
}
