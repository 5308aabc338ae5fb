//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources handed to every handler and observer connection.

use crate::db::Db;
use dialer_core::{ConversationLog, DispatchOrchestrator, EventBroadcaster};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DispatchOrchestrator>,
    /// Same broadcaster the orchestrator publishes through.
    pub broadcaster: Arc<EventBroadcaster>,
    pub conversation_log: Arc<dyn ConversationLog>,
    /// Present only when a database is configured.
    pub db: Option<Arc<Db>>,
}
