//! Dispatch Orchestrator
//!
//! Drives a single dispatch from a borrower record to a terminal state:
//!
//! `Requested → Connecting → RoomCreating → AgentDispatching → Ringing → Succeeded`
//!
//! Any provider error moves the session straight to `Failed` and skips the
//! remaining steps. A status event is published on entry to every state,
//! before the provider call that state stands for, so observers always see
//! "attempting X" ahead of any failure of X. The provider connection acquired
//! for the dispatch is closed on every path once it has been opened.

use crate::{
    borrower::{BorrowerRecord, ChannelPreference},
    broadcaster::EventBroadcaster,
    conversation::{ConversationEntry, ConversationLog},
    error::DispatchError,
    events::{CampaignStatus, ObserverEvent, StatusEvent},
    provider::{
        AgentDispatchRequest, CreateRoomRequest, ProviderConnection, ProviderError, Room,
        RoomProvider,
    },
    registry::SessionRegistry,
    retry::RetryPolicy,
    session::{DispatchSession, DispatchState},
};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{Instrument, debug, error, info, instrument, warn};

/// Tunables for every dispatch made by one orchestrator.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Name of the agent the provider attaches to the room.
    pub agent_name: String,
    /// Seconds an empty room survives before the provider reclaims it.
    pub room_empty_timeout_secs: u32,
    pub max_participants: u32,
    /// Client-side bound on each provider call.
    pub provider_timeout: Duration,
    /// Retry policy for room creation. Agent dispatch is never retried.
    pub room_retry: RetryPolicy,
    /// Dialing prefix used for the phone sent to the agent.
    pub country_code: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            agent_name: "Voice_Agent_Riya".to_string(),
            room_empty_timeout_secs: 600,
            max_participants: 20,
            provider_timeout: Duration::from_secs(15),
            room_retry: RetryPolicy::default(),
            country_code: "+91".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct DispatchOrchestrator {
    provider: Arc<dyn RoomProvider>,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    conversation_log: Option<Arc<dyn ConversationLog>>,
    settings: DispatchSettings,
}

impl DispatchOrchestrator {
    pub fn new(
        provider: Arc<dyn RoomProvider>,
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<EventBroadcaster>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            broadcaster,
            conversation_log: None,
            settings,
        }
    }

    /// Appends a line to `log` whenever a dispatch finishes.
    pub fn with_conversation_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.conversation_log = Some(log);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Runs one dispatch to completion and returns the terminal session.
    ///
    /// Validation failures, non-voice borrowers and phones with an active
    /// session are rejected before anything is registered or contacted.
    ///
    /// Once registered, the dispatch runs on its own task. Dropping the
    /// returned future does not cancel it: the session still reaches a
    /// terminal state and the phone is released.
    #[instrument(name = "dispatch", skip_all, fields(phone = %record.phone, session_id))]
    pub async fn start_dispatch(
        &self,
        record: BorrowerRecord,
    ) -> Result<DispatchSession, DispatchError> {
        record.validate()?;
        if record.channel_preference != ChannelPreference::Voice {
            info!(channel = %record.channel_preference, "Borrower does not prefer voice; declining");
            return Err(DispatchError::Declined {
                phone: record.phone,
                channel: record.channel_preference,
            });
        }

        let metadata = record.provider_metadata(&self.settings.country_code);
        let session = DispatchSession::new(&record.phone, metadata);
        if !self.registry.try_register(session.clone()) {
            warn!("Dispatch already in progress for this phone");
            return Err(DispatchError::AlreadyInProgress {
                phone: record.phone,
            });
        }
        tracing::Span::current().record("session_id", tracing::field::display(session.session_id));
        info!(room = %session.room_name, "Dispatch registered");
        self.emit(&session, "Dispatch requested");

        let registered = session.clone();
        let dispatch = self.clone();
        let task = tokio::spawn(async move { dispatch.drive(session).await }.in_current_span());
        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let session_id = registered.session_id;
                let mut session = self
                    .registry
                    .get(&registered.phone)
                    .filter(|s| s.session_id == session_id)
                    .unwrap_or(registered);
                let source = ProviderError::Aborted(join_error.to_string());
                if session.state.is_terminal() {
                    return Err(DispatchError::ProviderFailure {
                        session: Box::new(session),
                        source,
                    });
                }
                Err(self.abandon(&mut session, source))
            }
        }
    }

    /// Drives a registered session to a terminal state.
    async fn drive(self, mut session: DispatchSession) -> Result<DispatchSession, DispatchError> {
        match self.run(&mut session).await {
            Ok(()) => {
                session.transition(DispatchState::Succeeded);
                self.settle(&session, "Agent dispatched", CampaignStatus::running(&session.phone));
                info!(dispatch_id = ?session.provider_dispatch_id, "Dispatch succeeded");
                Ok(session)
            }
            Err(source) => Err(self.fail(&mut session, source)),
        }
    }

    fn fail(&self, session: &mut DispatchSession, source: ProviderError) -> DispatchError {
        let failed_at = session.state;
        session.fail(&source.message());
        let message = format!("Call failed: {source}");
        self.settle(session, &message, CampaignStatus::failed(&session.phone, None));
        error!(%failed_at, error = %source, "Dispatch failed");
        DispatchError::ProviderFailure {
            session: Box::new(session.clone()),
            source,
        }
    }

    /// Fails a session whose dispatch task died before settling it.
    fn abandon(&self, session: &mut DispatchSession, source: ProviderError) -> DispatchError {
        warn!(state = %session.state, error = %source, "Dispatch task ended without settling");
        self.fail(session, source)
    }

    /// Acquires a provider connection, places the call and always releases it.
    async fn run(&self, session: &mut DispatchSession) -> Result<(), ProviderError> {
        self.advance(session, DispatchState::Connecting, "Connecting to SIP trunk");
        let mut connection = self.bounded(self.provider.connect()).await?;

        let result = self.place_call(session, connection.as_mut()).await;

        if tokio::time::timeout(self.settings.provider_timeout, connection.close())
            .await
            .is_err()
        {
            warn!("Timed out closing provider connection");
        }
        result
    }

    async fn place_call(
        &self,
        session: &mut DispatchSession,
        connection: &mut dyn ProviderConnection,
    ) -> Result<(), ProviderError> {
        self.advance(session, DispatchState::RoomCreating, "Creating conversation room");
        let room_request = CreateRoomRequest {
            name: session.room_name.clone(),
            empty_timeout: self.settings.room_empty_timeout_secs,
            max_participants: self.settings.max_participants,
        };
        let room = self.create_room(connection, &room_request).await?;
        debug!(room_sid = %room.sid, "Room created");

        self.advance(session, DispatchState::AgentDispatching, "Connecting to agent");
        let metadata = serde_json::to_string(&session.metadata)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let dispatch_request = AgentDispatchRequest {
            agent_name: self.settings.agent_name.clone(),
            room: session.room_name.clone(),
            metadata,
        };
        let dispatch = self.bounded(connection.dispatch_agent(&dispatch_request)).await?;
        session.provider_dispatch_id = Some(dispatch.id);

        self.advance(session, DispatchState::Ringing, "Call is ringing");
        Ok(())
    }

    async fn create_room(
        &self,
        connection: &mut dyn ProviderConnection,
        request: &CreateRoomRequest,
    ) -> Result<Room, ProviderError> {
        let policy = self.settings.room_retry;
        let mut attempt = 0;
        loop {
            match self.bounded(connection.create_room(request)).await {
                Ok(room) => return Ok(room),
                Err(err) if attempt < policy.max_retries && err.is_transient() => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    warn!(error = %err, attempt, ?delay, "Room creation failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Applies the client-side timeout to a provider call.
    async fn bounded<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let limit = self.settings.provider_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(limit)))
    }

    fn advance(&self, session: &mut DispatchSession, next: DispatchState, message: &str) {
        session.transition(next);
        self.registry.record(session);
        self.emit(session, message);
    }

    fn emit(&self, session: &DispatchSession, message: &str) {
        let delivered = self
            .broadcaster
            .publish(ObserverEvent::CallStatus(StatusEvent::for_session(session, message)));
        debug!(state = %session.state, observers = delivered, "{message}");
    }

    /// Records a terminal session, frees the phone and tells everyone.
    fn settle(&self, session: &DispatchSession, message: &str, campaign: CampaignStatus) {
        self.registry.record(session);
        self.registry.mark_terminal(&session.phone);
        self.emit(session, message);
        self.broadcaster.publish(ObserverEvent::CampaignStatus(campaign));
        self.log_conversation(&session.phone, message);
    }

    fn log_conversation(&self, phone: &str, message: &str) {
        let Some(log) = self.conversation_log.clone() else {
            return;
        };
        let entry = ConversationEntry::system(phone, message);
        tokio::spawn(
            async move {
                if let Err(e) = log.append(entry).await {
                    warn!(error = ?e, "Failed to append conversation entry");
                }
            }
            .in_current_span(),
        );
    }
}
