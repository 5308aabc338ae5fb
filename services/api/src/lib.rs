//! Dialer API Library Crate
//!
//! This library contains the web layer of the dialer service: configuration,
//! application state, database access, REST handlers, the observer WebSocket
//! gateway, and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
