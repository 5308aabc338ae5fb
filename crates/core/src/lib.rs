pub mod borrower;
pub mod broadcaster;
pub mod conversation;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod session;

pub use borrower::{BorrowerError, BorrowerRecord, ChannelPreference, ProviderMetadata};
pub use broadcaster::{EventBroadcaster, ObserverId, Subscription};
pub use conversation::{ConversationEntry, ConversationLog, ConversationRole, TracingConversationLog};
pub use error::DispatchError;
pub use events::{CampaignStatus, ObserverEvent, StatusEvent};
pub use orchestrator::{DispatchOrchestrator, DispatchSettings};
pub use provider::{LiveKitClient, LiveKitCredentials, ProviderError, RoomProvider};
pub use registry::SessionRegistry;
pub use retry::RetryPolicy;
pub use session::{DispatchSession, DispatchState};
