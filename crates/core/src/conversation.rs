//! Conversation Log Seam
//!
//! The orchestrator appends short entries about each dispatch to an external
//! conversation history keyed by phone. It never waits on this: appends are
//! fire-and-forget and a failing log never affects a dispatch.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    Agent,
    Borrower,
    System,
}

impl ConversationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationRole::Agent => "agent",
            ConversationRole::Borrower => "borrower",
            ConversationRole::System => "system",
        }
    }
}

impl fmt::Display for ConversationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(ConversationRole::Agent),
            "borrower" | "user" => Ok(ConversationRole::Borrower),
            "system" => Ok(ConversationRole::System),
            other => Err(anyhow!("unknown conversation role '{other}'")),
        }
    }
}

/// A single line of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub phone: String,
    pub role: ConversationRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(phone: &str, role: ConversationRole, message: impl Into<String>) -> Self {
        Self {
            phone: phone.to_string(),
            role,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(phone: &str, message: impl Into<String>) -> Self {
        Self::new(phone, ConversationRole::System, message)
    }
}

/// Append-only store of conversation history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append(&self, entry: ConversationEntry) -> Result<()>;
}

/// A `ConversationLog` that only writes entries to the tracing output.
///
/// Used when no database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConversationLog;

#[async_trait]
impl ConversationLog for TracingConversationLog {
    async fn append(&self, entry: ConversationEntry) -> Result<()> {
        info!(
            phone = %entry.phone,
            role = %entry.role,
            message = %entry.message,
            "Conversation entry"
        );
        Ok(())
    }
}
