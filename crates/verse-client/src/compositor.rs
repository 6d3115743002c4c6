//! Orchestration of one channel view.
//!
//! The [`Compositor`] owns the channel's [`MessageStore`] and is its only
//! writer. It subscribes to the change feed, runs the initial load, inserts
//! optimistic messages on send, and reconciles feed signals and persist
//! completions one at a time through [`Compositor::next_event`].
//!
//! Persist requests run in spawned tasks and report back over an internal
//! channel. Each completion carries the liveness token it was issued under;
//! tearing the view down bumps the token, so results that arrive afterwards
//! are dropped instead of being applied to a different channel's state.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use verse_shared::{
    Attachment, Channel, ChannelId, ChannelKind, ChatError, FeedEvent, Message, MessageId,
    MessagePatch, NewChannel, NewMessage, ValidationError, VerseId,
};
use verse_store::{project, Applied, MessageStore, Snapshot, ThreadFilter};

use crate::collaborators::Collaborators;
use crate::config::ClientConfig;
use crate::events::ViewEvent;
use crate::feed::{FeedSignal, FeedSubscription};
use crate::state::ViewState;

/// Result of an async request issued by the view.
#[derive(Debug)]
enum Completion {
    Persisted {
        liveness: u64,
        local_id: MessageId,
        result: Result<Message, ChatError>,
    },
}

enum Step {
    Feed(Option<FeedSignal>),
    Done(Completion),
}

pub struct Compositor {
    verse_id: VerseId,
    config: Arc<ClientConfig>,
    collaborators: Collaborators,
    store: MessageStore,
    filter: ThreadFilter,
    state: ViewState,
    subscription: Option<FeedSubscription>,
    /// Bumped on teardown; completions issued under an older value are stale.
    liveness: u64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Compositor {
    pub fn new(
        verse_id: VerseId,
        channel_id: ChannelId,
        config: Arc<ClientConfig>,
        collaborators: Collaborators,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            verse_id,
            store: MessageStore::new(channel_id, config.correlation_window),
            config,
            collaborators,
            filter: ThreadFilter::Root,
            state: ViewState::Idle,
            subscription: None,
            liveness: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.store.channel_id()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn filter(&self) -> &ThreadFilter {
        &self.filter
    }

    /// Ordered messages of the whole channel.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Messages visible under the current thread filter.
    pub fn view(&self) -> Vec<&Message> {
        project(self.store.messages(), &self.filter)
    }

    /// Switch between the root view and a thread. The feed subscription is
    /// unaffected.
    pub fn set_thread(&mut self, filter: ThreadFilter) {
        debug!(channel = %self.channel_id(), parent = ?filter.parent(), "Thread filter changed");
        self.filter = filter;
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Subscribe to the feed and run the initial load.
    ///
    /// The subscription is taken first so nothing committed during the load
    /// is missed; signals that arrive meanwhile stay queued and are replayed
    /// by [`next_event`](Self::next_event) against the loaded state.
    ///
    /// A failed load leaves the view live with an empty store and returns
    /// the error for the caller to surface. A failed subscription is retried
    /// from the event pump.
    pub async fn mount(&mut self) -> Result<usize, ChatError> {
        self.ensure_open()?;
        let channel = self.channel_id();
        self.state = ViewState::Loading;
        info!(channel = %channel, "Mounting channel view");

        match self.collaborators.feed.subscribe(channel).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => warn!(channel = %channel, error = %e, "Feed subscription failed"),
        }

        let loaded = self.collaborators.persistence.select_messages(channel).await;
        self.state = if self.subscription.is_some() {
            ViewState::Live
        } else {
            ViewState::Reloading
        };

        match loaded {
            Ok(messages) => {
                self.store.load(messages);
                Ok(self.store.len())
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Initial load failed");
                self.store.load(Vec::new());
                Err(e)
            }
        }
    }

    /// Release the subscription and discard local state. Late completions
    /// of requests issued before this call are ignored.
    pub fn teardown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.liveness += 1;
        self.store = MessageStore::new(self.channel_id(), self.config.correlation_window);
        self.state = ViewState::TornDown;
        info!(channel = %self.channel_id(), "Channel view torn down");
    }

    /// Tear down the current channel and mount `channel`.
    pub async fn switch_channel(&mut self, channel: ChannelId) -> Result<usize, ChatError> {
        self.teardown();
        self.store = MessageStore::new(channel, self.config.correlation_window);
        self.filter = ThreadFilter::Root;
        self.state = ViewState::Idle;
        self.mount().await
    }

    // -----------------------------------------------------------------------
    // Event pump
    // -----------------------------------------------------------------------

    /// Wait for the next feed signal or request completion and apply it.
    ///
    /// Returns `None` when the view is idle or torn down.
    pub async fn next_event(&mut self) -> Option<ViewEvent> {
        loop {
            match self.state {
                ViewState::Idle | ViewState::TornDown => return None,
                ViewState::Reloading if self.subscription.is_none() => {
                    return Some(self.recover().await);
                }
                _ => {}
            }

            let step = match self.subscription.as_mut() {
                Some(subscription) => tokio::select! {
                    signal = subscription.recv() => Step::Feed(signal),
                    Some(done) = self.completions_rx.recv() => Step::Done(done),
                },
                None => match self.completions_rx.recv().await {
                    Some(done) => Step::Done(done),
                    None => return None,
                },
            };

            let event = match step {
                Step::Feed(Some(signal)) => self.on_signal(signal).await,
                Step::Feed(None) => {
                    warn!(channel = %self.channel_id(), "Feed stream ended, resubscribing");
                    self.subscription = None;
                    self.state = ViewState::Reloading;
                    Some(self.recover().await)
                }
                Step::Done(done) => self.on_completion(done),
            };

            if let Some(event) = event {
                return Some(event);
            }
        }
    }

    async fn on_signal(&mut self, signal: FeedSignal) -> Option<ViewEvent> {
        match signal {
            FeedSignal::Change(payload) => match payload.into_message_event() {
                Ok(event) => Some(ViewEvent::Applied(self.apply(event))),
                Err(e) => {
                    warn!(channel = %self.channel_id(), error = %e, "Undecodable change payload");
                    None
                }
            },
            FeedSignal::ConnectionLost => {
                info!(channel = %self.channel_id(), "Feed connection lost");
                self.state = ViewState::Reloading;
                Some(ViewEvent::ConnectionLost)
            }
            FeedSignal::Reconnected => {
                info!(channel = %self.channel_id(), "Feed reconnected, reloading");
                self.state = ViewState::Reloading;
                Some(self.recover().await)
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Option<ViewEvent> {
        match completion {
            Completion::Persisted {
                liveness,
                local_id,
                result,
            } => {
                if liveness != self.liveness {
                    debug!(local_id = %local_id, "Discarding completion from a torn-down view");
                    return None;
                }
                match result {
                    Ok(record) => {
                        let id = record.id.clone();
                        let applied = self.apply(FeedEvent::Insert(record));
                        Some(ViewEvent::Confirmed {
                            local_id,
                            id,
                            applied,
                        })
                    }
                    Err(error) => {
                        warn!(local_id = %local_id, error = %error, "Send failed");
                        Some(ViewEvent::SendFailed { local_id, error })
                    }
                }
            }
        }
    }

    fn apply(&mut self, event: FeedEvent) -> Applied {
        let kind = event.kind();
        let applied = self.store.apply_server_event(event);
        if let Applied::Missed(id) = &applied {
            debug!(error = %ChatError::CorrelationMiss(id.clone()), ?kind, "Ignored feed event");
        }
        applied
    }

    /// Re-subscribe if needed and re-load, retrying with linear backoff.
    async fn recover(&mut self) -> ViewEvent {
        let channel = self.channel_id();
        let attempts = self.config.reload_attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.reload_backoff * (attempt - 1)).await;
            }

            if self.subscription.is_none() {
                match self.collaborators.feed.subscribe(channel).await {
                    Ok(subscription) => self.subscription = Some(subscription),
                    Err(e) => {
                        warn!(channel = %channel, attempt, error = %e, "Resubscribe failed");
                        continue;
                    }
                }
            }

            match self.collaborators.persistence.select_messages(channel).await {
                Ok(messages) => {
                    // Sends still in flight stay visible until they resolve.
                    self.store.reload(messages);
                    self.state = ViewState::Live;
                    info!(channel = %channel, attempt, count = self.store.len(), "Reloaded");
                    return ViewEvent::Reloaded {
                        count: self.store.len(),
                    };
                }
                Err(e) => warn!(channel = %channel, attempt, error = %e, "Reload failed"),
            }
        }

        warn!(channel = %channel, attempts, "Giving up on reload");
        ViewEvent::ReloadFailed(ChatError::FeedDisconnected)
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Send a message to the channel, or to the thread under `parent`.
    ///
    /// The message appears immediately with a local id; the persist request
    /// runs in the background and its outcome comes back through
    /// [`next_event`](Self::next_event). A rejected send is reported there
    /// and the optimistic message is left in place.
    pub async fn send(
        &mut self,
        body: &str,
        parent: Option<MessageId>,
    ) -> Result<MessageId, ChatError> {
        self.ensure_open()?;
        let actor = self
            .collaborators
            .auth
            .current_actor()
            .await
            .ok_or(ChatError::Unauthenticated)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::EmptyBody.into());
        }
        if let Some(parent) = &parent {
            self.check_parent(parent)?;
        }

        let channel = self.channel_id();
        let message = Message::optimistic(channel, &actor, parent.clone(), body.to_string());
        let local_id = message.id.clone();
        if self.store.insert_optimistic(message).is_none() {
            warn!(local_id = %local_id, "Optimistic insert rejected");
        }

        let request = NewMessage {
            channel_id: channel,
            author_id: actor.id,
            parent_id: parent,
            body: Some(body.to_string()),
            attachments: None,
        };
        let persistence = Arc::clone(&self.collaborators.persistence);
        let completions = self.completions_tx.clone();
        let liveness = self.liveness;
        let pending_id = local_id.clone();
        tokio::spawn(async move {
            let result = persistence.insert_message(request).await;
            let _ = completions.send(Completion::Persisted {
                liveness,
                local_id: pending_id,
                result,
            });
        });

        info!(channel = %channel, local_id = %local_id, "Message sent");
        Ok(local_id)
    }

    /// Replace the body of one of the actor's own messages. The store
    /// picks the change up from the feed.
    pub async fn edit(&mut self, id: &MessageId, body: &str) -> Result<(), ChatError> {
        self.ensure_open()?;
        let actor = self
            .collaborators
            .auth
            .current_actor()
            .await
            .ok_or(ChatError::Unauthenticated)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::EmptyBody.into());
        }

        let message = self
            .store
            .get(id)
            .ok_or_else(|| ChatError::CorrelationMiss(id.clone()))?;
        if message.is_local() {
            return Err(ValidationError::NotEditable("message is not confirmed yet").into());
        }
        if message.is_system() {
            return Err(ValidationError::NotEditable("system messages are read-only").into());
        }
        if message.is_deleted() {
            return Err(ValidationError::NotEditable("message was deleted").into());
        }
        if message.author_id != actor.id {
            return Err(ValidationError::NotEditable("only the author can edit").into());
        }

        let patch = MessagePatch::edit(body.to_string(), Utc::now());
        self.collaborators
            .persistence
            .update_message(id, &patch)
            .await?;
        info!(channel = %self.channel_id(), msg_id = %id, "Message edited");
        Ok(())
    }

    /// Upload a file and post it as an attachment-only message.
    pub async fn upload_attachment(
        &mut self,
        file_name: &str,
        bytes: Bytes,
        parent: Option<MessageId>,
    ) -> Result<Attachment, ChatError> {
        self.ensure_open()?;
        let actor = self
            .collaborators
            .auth
            .current_actor()
            .await
            .ok_or(ChatError::Unauthenticated)?;

        let max = self.config.max_attachment_size;
        if bytes.len() > max {
            return Err(ValidationError::AttachmentTooLarge {
                size: bytes.len(),
                max,
            }
            .into());
        }
        if let Some(parent) = &parent {
            self.check_parent(parent)?;
        }

        let size = bytes.len() as u64;
        let path = format!("{}/{}_{}", actor.id, Utc::now().timestamp_millis(), file_name);
        let url = self.collaborators.blobs.upload(&path, bytes).await?;
        let attachment = Attachment {
            url,
            name: file_name.to_string(),
            size_bytes: size,
        };

        let record = self
            .collaborators
            .persistence
            .insert_message(NewMessage {
                channel_id: self.channel_id(),
                author_id: actor.id,
                parent_id: parent,
                body: None,
                attachments: Some(vec![attachment.clone()]),
            })
            .await?;

        if self.state.is_open() {
            self.apply(FeedEvent::Insert(record));
        }
        info!(channel = %self.channel_id(), path = %path, size, "Attachment posted");
        Ok(attachment)
    }

    /// Ask the summarisation job to summarise the current view.
    pub async fn request_summary(&self) -> Result<(), ChatError> {
        self.ensure_open()?;
        self.collaborators
            .summary
            .request_summary(self.channel_id(), self.filter.parent())
            .await?;
        info!(channel = %self.channel_id(), thread = ?self.filter.parent(), "Summary requested");
        Ok(())
    }

    /// Create a time-limited room in the current verse.
    pub async fn create_room(&self) -> Result<Channel, ChatError> {
        let actor = self
            .collaborators
            .auth
            .current_actor()
            .await
            .ok_or(ChatError::Unauthenticated)?;

        let room = NewChannel {
            verse_id: self.verse_id,
            name: format!("room-{}", Local::now().format("%H:%M:%S")),
            kind: ChannelKind::Room,
            ttl_hours: Some(self.config.room_ttl_hours),
            created_by: actor.id,
        };
        let channel = self.collaborators.persistence.insert_channel(room).await?;
        info!(verse = %self.verse_id, channel = %channel.id, name = %channel.name, "Room created");
        Ok(channel)
    }

    fn ensure_open(&self) -> Result<(), ChatError> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(ChatError::TornDown)
        }
    }

    /// Replies may only target confirmed root messages.
    fn check_parent(&self, parent: &MessageId) -> Result<(), ChatError> {
        if parent.is_local() {
            return Err(ValidationError::InvalidParent("parent is not confirmed yet").into());
        }
        match self.store.get(parent) {
            Some(message) if !message.is_root() => {
                Err(ValidationError::InvalidParent("replies cannot be nested").into())
            }
            _ => Ok(()),
        }
    }
}
