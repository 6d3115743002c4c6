//! External collaborators of a channel view.
//!
//! Each backend concern sits behind an object-safe trait so a view is
//! constructed with explicit instances rather than reaching for a global
//! client. [`RestBackend`](crate::RestBackend) implements the HTTP ones.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use verse_shared::{
    Actor, Channel, ChannelId, ChatError, Message, MessageId, MessagePatch, NewChannel,
    NewMessage, VerseId,
};

use crate::feed::ChangeFeed;

/// Row storage behind the chat.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// All messages of `channel`, oldest first, with author info joined.
    async fn select_messages(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError>;

    /// Insert a message and return the stored row.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError>;

    async fn update_message(&self, id: &MessageId, patch: &MessagePatch) -> Result<(), ChatError>;

    /// All channels of `verse`, oldest first.
    async fn list_channels(&self, verse: VerseId) -> Result<Vec<Channel>, ChatError>;

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, ChatError>;
}

/// Session lookup. May suspend (token refresh).
#[async_trait]
pub trait Auth: Send + Sync {
    async fn current_actor(&self) -> Option<Actor>;
}

/// Attachment storage.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` at `path` and return the public URL.
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, ChatError>;
}

/// Outbound trigger for the external summarisation job.
#[async_trait]
pub trait SummaryTrigger: Send + Sync {
    async fn request_summary(
        &self,
        channel: ChannelId,
        thread: Option<&MessageId>,
    ) -> Result<(), ChatError>;
}

/// Everything a channel view talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub persistence: Arc<dyn Persistence>,
    pub feed: Arc<dyn ChangeFeed>,
    pub auth: Arc<dyn Auth>,
    pub blobs: Arc<dyn BlobStorage>,
    pub summary: Arc<dyn SummaryTrigger>,
}

/// Auth collaborator with a fixed session.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    actor: Option<Actor>,
}

impl StaticAuth {
    pub fn signed_in(actor: Actor) -> Self {
        Self { actor: Some(actor) }
    }

    pub fn anonymous() -> Self {
        Self { actor: None }
    }
}

#[async_trait]
impl Auth for StaticAuth {
    async fn current_actor(&self) -> Option<Actor> {
        self.actor.clone()
    }
}
