//! Session Registry
//!
//! Indexes dispatch sessions by phone number and enforces that at most one
//! session per phone is active. The check-and-register step goes through the
//! map's entry API, which holds the shard lock for the whole test-and-set, so
//! two racing registrations for the same phone can never both win.
//!
//! Terminal sessions stay in the index as history until the phone is
//! dispatched again.

use crate::session::DispatchSession;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::debug;

#[derive(Debug)]
struct RegisteredSession {
    session: DispatchSession,
    active: bool,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, RegisteredSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` as the active session for its phone.
    ///
    /// Returns false, leaving the existing session untouched, when the phone
    /// already has an active session.
    pub fn try_register(&self, session: DispatchSession) -> bool {
        match self.sessions.entry(session.phone.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().active {
                    return false;
                }
                debug!(phone = %session.phone, session_id = %session.session_id, "Replacing finished session");
                occupied.insert(RegisteredSession {
                    session,
                    active: true,
                });
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RegisteredSession {
                    session,
                    active: true,
                });
                true
            }
        }
    }

    /// Stores the latest snapshot of a registered session.
    ///
    /// Snapshots from a session that no longer owns the phone are ignored.
    pub fn record(&self, session: &DispatchSession) -> bool {
        match self.sessions.get_mut(&session.phone) {
            Some(mut entry) if entry.session.session_id == session.session_id => {
                entry.session = session.clone();
                true
            }
            _ => false,
        }
    }

    /// Releases the phone so a new dispatch may register for it.
    pub fn mark_terminal(&self, phone: &str) -> bool {
        match self.sessions.get_mut(phone) {
            Some(mut entry) if entry.active => {
                entry.active = false;
                true
            }
            _ => false,
        }
    }

    /// The most recent session for `phone`, active or finished.
    pub fn get(&self, phone: &str) -> Option<DispatchSession> {
        self.sessions.get(phone).map(|entry| entry.session.clone())
    }

    pub fn is_active(&self, phone: &str) -> bool {
        self.sessions.get(phone).is_some_and(|entry| entry.active)
    }

    /// All active sessions, oldest first.
    pub fn list_active(&self) -> Vec<DispatchSession> {
        let mut active: Vec<DispatchSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.session.clone())
            .collect();
        active.sort_by_key(|session| session.created_at);
        active
    }
}
