//! Lifecycle of a channel view.

/// Where a [`Compositor`](crate::Compositor) is in its lifecycle.
///
/// `Idle → Loading → Live ⇄ Reloading`, and any state `→ TornDown` on
/// unmount or channel switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Constructed, nothing loaded or subscribed.
    Idle,
    /// Initial load in flight; feed signals queue up behind it.
    Loading,
    /// Loaded and receiving feed events.
    Live,
    /// The feed connection dropped; waiting to re-load.
    Reloading,
    /// Subscription released and local state discarded.
    TornDown,
}

impl ViewState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::TornDown)
    }
}
