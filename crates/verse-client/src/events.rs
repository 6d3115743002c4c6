use verse_shared::{ChatError, MessageId};
use verse_store::Applied;

/// What changed in a channel view after one step of the event pump.
#[derive(Debug)]
pub enum ViewEvent {
    /// A change-feed event was reconciled into the store.
    Applied(Applied),
    /// A send was accepted by the backend and reconciled.
    Confirmed {
        local_id: MessageId,
        id: MessageId,
        applied: Applied,
    },
    /// A send was rejected. The optimistic message stays visible.
    SendFailed { local_id: MessageId, error: ChatError },
    /// The feed connection dropped; the view keeps its last contents.
    ConnectionLost,
    /// The view was re-loaded after a reconnect.
    Reloaded { count: usize },
    /// Reloading gave up after the configured attempts.
    ReloadFailed(ChatError),
}

impl ViewEvent {
    /// Whether the presentation layer should re-render.
    pub fn needs_render(&self) -> bool {
        match self {
            Self::Applied(applied) => applied.changed(),
            Self::Confirmed { applied, .. } => applied.changed(),
            Self::Reloaded { .. } => true,
            Self::SendFailed { .. } | Self::ConnectionLost | Self::ReloadFailed(_) => false,
        }
    }

    /// User-facing notice for events that warrant one.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::SendFailed { error, .. } => Some(error.to_string()),
            Self::ReloadFailed(error) => Some(error.to_string()),
            _ => None,
        }
    }
}
