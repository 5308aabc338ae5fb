use crate::{
    borrower::{BorrowerError, ChannelPreference},
    provider::ProviderError,
    session::DispatchSession,
};

/// Everything `start_dispatch` can refuse or fail with.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed borrower record. Nothing was registered or contacted.
    #[error("invalid borrower input: {0}")]
    InvalidInput(#[from] BorrowerError),

    /// The phone already has an active session, which is left untouched.
    #[error("a dispatch is already in progress for {phone}")]
    AlreadyInProgress { phone: String },

    /// The borrower prefers a channel other than voice; no call is placed.
    #[error("borrower {phone} prefers '{channel}', not voice; dispatch declined")]
    Declined {
        phone: String,
        channel: ChannelPreference,
    },

    /// The provider failed mid-dispatch. `session` is the terminal snapshot.
    #[error("provider failure for {}: {source}", .session.phone)]
    ProviderFailure {
        session: Box<DispatchSession>,
        #[source]
        source: ProviderError,
    },

    /// Missing or blank provider credentials.
    #[error("configuration error: {0}")]
    Configuration(String),
}
