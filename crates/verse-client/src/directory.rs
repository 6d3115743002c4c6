//! Channel list of a verse, kept fresh from the change feed.
//!
//! Channel lists are short, so any change signal triggers a full re-list
//! rather than an incremental merge.

use std::sync::Arc;

use tracing::{debug, info, warn};

use verse_shared::{Channel, ChatError, VerseId};

use crate::collaborators::{Collaborators, Persistence};
use crate::feed::{ChangeFeed, FeedSignal, FeedSubscription};

pub struct ChannelDirectory {
    verse_id: VerseId,
    persistence: Arc<dyn Persistence>,
    feed: Arc<dyn ChangeFeed>,
    channels: Vec<Channel>,
    subscription: Option<FeedSubscription>,
}

impl ChannelDirectory {
    pub fn new(verse_id: VerseId, collaborators: &Collaborators) -> Self {
        Self {
            verse_id,
            persistence: Arc::clone(&collaborators.persistence),
            feed: Arc::clone(&collaborators.feed),
            channels: Vec::new(),
            subscription: None,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Subscribe to channel changes and fetch the initial list.
    pub async fn open(&mut self) -> Result<&[Channel], ChatError> {
        self.subscription = Some(self.feed.subscribe_directory(self.verse_id).await?);
        self.refresh().await?;
        info!(verse = %self.verse_id, count = self.channels.len(), "Channel directory open");
        Ok(&self.channels)
    }

    /// Wait for the next change and re-list. Returns `None` once the
    /// subscription is closed.
    pub async fn next_change(&mut self) -> Option<Result<&[Channel], ChatError>> {
        loop {
            let signal = self.subscription.as_mut()?.recv().await;
            match signal {
                Some(FeedSignal::Change(_)) | Some(FeedSignal::Reconnected) => break,
                Some(FeedSignal::ConnectionLost) => {
                    debug!(verse = %self.verse_id, "Directory feed connection lost");
                }
                None => {
                    warn!(verse = %self.verse_id, "Directory feed ended");
                    self.subscription = None;
                    return None;
                }
            }
        }

        Some(self.refresh().await.map(|()| self.channels.as_slice()))
    }

    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    async fn refresh(&mut self) -> Result<(), ChatError> {
        let mut channels = self.persistence.list_channels(self.verse_id).await?;
        channels.sort_by_key(|c| c.created_at);
        self.channels = channels;
        Ok(())
    }
}
