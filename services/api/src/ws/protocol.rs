//! Defines the WebSocket message protocol between dashboards and the API server.
//!
//! Outbound frames are [`dialer_core::ObserverEvent`]s. Inbound frames share
//! the same `{"event": ..., "data": {...}}` envelope.

use serde::Deserialize;
use serde_json::Value;

/// Commands sent from an observer to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Dials the first borrower of the list. Rows use the loose ingestion shape.
    StartCampaign { borrowers: Vec<Value> },
    /// A transcript line relayed by the calling agent.
    ConversationUpdate {
        phone: String,
        role: String,
        message: String,
    },
}

/// Best-effort phone of a row that failed canonicalization, for error replies.
pub(crate) fn raw_phone(row: &Value) -> String {
    ["phone", "Mobile_No", "phone_no"]
        .iter()
        .filter_map(|key| row.get(*key))
        .find_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string().trim_end_matches(".0").to_string()),
            _ => None,
        })
        .unwrap_or_default()
}
