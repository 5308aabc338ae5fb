//! Observer Gateway
//!
//! Real-time dashboard connections over WebSockets:
//!
//! - `protocol`: the JSON commands observers may send.
//! - `session`: connection lifecycle, from subscription to unsubscribe.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
