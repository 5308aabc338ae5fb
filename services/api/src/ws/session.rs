//! Manages the lifetime of one observer connection.
//!
//! Each socket owns exactly one broadcaster subscription. A writer task
//! forwards broadcast events and direct replies to the socket while the
//! reader loop handles inbound commands. Whichever side ends first tears the
//! connection down and unsubscribes.

use super::protocol::{ClientCommand, raw_phone};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use dialer_core::{
    BorrowerRecord, CampaignStatus, ConversationEntry, ConversationRole, DispatchError,
    DispatchSession, ObserverEvent, Subscription,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};

/// Direct replies are rare; a small queue is plenty.
const REPLY_BUFFER: usize = 16;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "observer", skip_all, fields(observer_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let subscription = state.broadcaster.subscribe();
    let observer_id = subscription.id();
    tracing::Span::current().record("observer_id", observer_id);
    info!(
        observers = state.broadcaster.observer_count(),
        "Observer connected"
    );

    let (socket_tx, mut socket_rx) = socket.split();
    let (reply_tx, reply_rx) = mpsc::channel(REPLY_BUFFER);
    let mut writer =
        tokio::spawn(write_events(socket_tx, subscription, reply_rx).in_current_span());

    loop {
        tokio::select! {
            frame = socket_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_command(&state, text.as_str(), &reply_tx).await,
                Some(Ok(Message::Close(_))) | None => {
                    info!("Observer closed the connection.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Error receiving from observer WebSocket");
                    break;
                }
            },
            _ = &mut writer => {
                info!("Observer stream ended.");
                break;
            }
        }
    }

    state.broadcaster.unsubscribe(observer_id);
    writer.abort();
    info!("Observer disconnected");
}

/// Forwards broadcast events and direct replies to the socket until either
/// the socket fails or the broadcaster drops this observer.
async fn write_events(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    mut replies: mpsc::Receiver<ObserverEvent>,
) {
    loop {
        let event = tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => event,
                None => {
                    warn!("Observer was dropped by the broadcaster");
                    break;
                }
            },
            Some(event) = replies.recv() => event,
        };
        if let Err(e) = send_event(&mut socket_tx, &event).await {
            warn!(error = %e, event = event.name(), "Failed to write to observer");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

async fn handle_command(state: &Arc<AppState>, text: &str, reply: &mpsc::Sender<ObserverEvent>) {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Ignoring unrecognised observer frame");
            return;
        }
    };

    match command {
        ClientCommand::StartCampaign { borrowers } => start_campaign(state, &borrowers, reply),
        ClientCommand::ConversationUpdate {
            phone,
            role,
            message,
        } => relay_conversation(state, &phone, &role, message).await,
    }
}

/// Dials the first borrower on a background task so the socket keeps reading.
fn start_campaign(state: &Arc<AppState>, borrowers: &[Value], reply: &mpsc::Sender<ObserverEvent>) {
    let Some(first) = borrowers.first() else {
        warn!("start_campaign carried no borrowers");
        return;
    };
    if borrowers.len() > 1 {
        debug!(
            ignored = borrowers.len() - 1,
            "Only the first borrower of a campaign is dialed"
        );
    }

    let record = match BorrowerRecord::from_value(first) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Rejected campaign borrower");
            let status = CampaignStatus::failed(&raw_phone(first), Some(&e.to_string()));
            if reply.try_send(ObserverEvent::CampaignStatus(status)).is_err() {
                warn!("Reply queue full; dropping campaign status");
            }
            return;
        }
    };

    let state = Arc::clone(state);
    let reply = reply.clone();
    let phone = record.phone.clone();
    tokio::spawn(
        async move {
            let outcome = state.orchestrator.start_dispatch(record).await;
            if let Some(failure) = requester_reply(&phone, outcome) {
                let _ = reply.send(ObserverEvent::CampaignStatus(failure)).await;
            }
        }
        .in_current_span(),
    );
}

/// The status owed to the requester alone. Successes and provider failures
/// were already broadcast by the orchestrator.
fn requester_reply(
    phone: &str,
    outcome: Result<DispatchSession, DispatchError>,
) -> Option<CampaignStatus> {
    match outcome {
        Ok(_) | Err(DispatchError::ProviderFailure { .. }) => None,
        Err(DispatchError::Declined { phone, .. }) => {
            Some(CampaignStatus::failed(&phone, Some("Channel not voice")))
        }
        Err(DispatchError::AlreadyInProgress { phone }) => {
            Some(CampaignStatus::failed(&phone, Some("Call already in progress")))
        }
        Err(e) => Some(CampaignStatus::failed(phone, Some(&e.to_string()))),
    }
}

/// Persists a transcript line and shows it to every observer.
async fn relay_conversation(state: &AppState, phone: &str, role: &str, message: String) {
    let role: ConversationRole = match role.parse() {
        Ok(role) => role,
        Err(e) => {
            warn!(error = %e, "Ignoring conversation update");
            return;
        }
    };
    let entry = ConversationEntry::new(phone, role, message);
    if let Err(e) = state.conversation_log.append(entry.clone()).await {
        warn!(error = ?e, phone, "Failed to persist conversation update");
    }
    state
        .broadcaster
        .publish(ObserverEvent::ConversationUpdate(entry));
}

/// A helper function to serialize and send an `ObserverEvent` to the client.
async fn send_event(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    event: &ObserverEvent,
) -> Result<()> {
    let serialized = serde_json::to_string(event)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::{BorrowerError, ChannelPreference};

    #[test]
    fn test_unexpected_refusal_names_the_borrower() {
        let outcome = Err(DispatchError::Configuration("credentials missing".into()));

        assert_eq!(
            requester_reply("9876543210", outcome),
            Some(CampaignStatus::failed(
                "9876543210",
                Some("configuration error: credentials missing")
            ))
        );

        let outcome = Err(DispatchError::InvalidInput(BorrowerError::MissingField(
            "first_name",
        )));
        let reply = requester_reply("9876543210", outcome).unwrap();
        assert_eq!(reply.phone, "9876543210");
    }

    #[test]
    fn test_declined_and_duplicate_replies() {
        let declined = Err(DispatchError::Declined {
            phone: "9876543210".into(),
            channel: ChannelPreference::Whatsapp,
        });
        assert_eq!(
            requester_reply("9876543210", declined),
            Some(CampaignStatus::failed("9876543210", Some("Channel not voice")))
        );

        let duplicate = Err(DispatchError::AlreadyInProgress {
            phone: "9876543210".into(),
        });
        assert_eq!(
            requester_reply("9876543210", duplicate),
            Some(CampaignStatus::failed("9876543210", Some("Call already in progress")))
        );
    }
}
