//! Change-feed subscriptions.
//!
//! A subscription is a capability object: whoever holds the
//! [`FeedSubscription`] receives the signals, and releasing it (explicitly
//! or by dropping it) tears down the backend subscription exactly once.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use verse_shared::{ChangePayload, ChannelId, ChatError, VerseId};

/// Signals delivered on a subscription.
///
/// Change payloads for the same row arrive in order; there is no ordering
/// across rows.
#[derive(Debug, Clone)]
pub enum FeedSignal {
    /// A row changed.
    Change(ChangePayload),
    /// The underlying connection dropped. Changes made meanwhile are lost.
    ConnectionLost,
    /// The connection was re-established. No gap filling is offered.
    Reconnected,
}

/// Source of change-feed subscriptions.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to message changes of one channel.
    async fn subscribe(&self, channel: ChannelId) -> Result<FeedSubscription, ChatError>;

    /// Subscribe to changes of a verse's channel list.
    async fn subscribe_directory(&self, verse: VerseId) -> Result<FeedSubscription, ChatError>;
}

type Release = Box<dyn FnOnce() + Send>;

/// A live subscription. Released on [`unsubscribe`](Self::unsubscribe) or
/// drop, whichever comes first.
pub struct FeedSubscription {
    topic: String,
    signals: mpsc::Receiver<FeedSignal>,
    release: Option<Release>,
}

impl FeedSubscription {
    /// Wrap a signal receiver. `release` runs once when the subscription
    /// is given up.
    pub fn new(
        topic: impl Into<String>,
        signals: mpsc::Receiver<FeedSignal>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            signals,
            release: Some(Box::new(release)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Next signal, or `None` once the adapter closed the stream or the
    /// subscription was released.
    pub async fn recv(&mut self) -> Option<FeedSignal> {
        if !self.is_active() {
            return None;
        }
        self.signals.recv().await
    }

    /// Release the backend subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            self.signals.close();
            release();
            debug!(topic = %self.topic, "Released feed subscription");
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}
