//! Ordered message state for a single channel.
//!
//! The store is owned by one channel view and mutated through `&mut self`
//! only, so every mutation runs to completion before the next one starts.
//! Readers take a [`Snapshot`], which shares the current buffer; the next
//! mutation copies the buffer if a snapshot is still alive.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace, warn};

use verse_shared::{ChannelId, FeedEvent, Message, MessageId, MessagePatch};

/// Immutable view of the store at one point in time.
pub type Snapshot = Arc<Vec<Message>>;

/// Outcome of applying one change-feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new message was placed at `index`.
    Inserted { index: usize },
    /// The server echo replaced the optimistic message `local_id` in place.
    Correlated { local_id: MessageId, index: usize },
    /// An existing message was merged with the record.
    Merged { index: usize, changed: bool },
    /// The message at `index` was removed.
    Removed { index: usize },
    /// The event referenced an id the store does not hold.
    Missed(MessageId),
    /// The record belongs to another channel.
    Foreign(ChannelId),
}

impl Applied {
    /// Whether a reader would see a different list after this event.
    pub fn changed(&self) -> bool {
        match self {
            Self::Inserted { .. } | Self::Correlated { .. } | Self::Removed { .. } => true,
            Self::Merged { changed, .. } => *changed,
            Self::Missed(_) | Self::Foreign(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    channel_id: ChannelId,
    messages: Arc<Vec<Message>>,
    /// Maximum timestamp distance between an optimistic message and the
    /// server record it is paired with.
    correlation_window: Duration,
}

impl MessageStore {
    pub fn new(channel_id: ChannelId, correlation_window: Duration) -> Self {
        Self {
            channel_id,
            messages: Arc::new(Vec::new()),
            correlation_window,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Replace the whole contents with `initial`.
    ///
    /// The input is expected in `created_at` order; it is stably re-sorted
    /// anyway, and a repeated id keeps only its last occurrence.
    pub fn load(&mut self, initial: Vec<Message>) {
        let mut slots: HashMap<MessageId, usize> = HashMap::with_capacity(initial.len());
        let mut messages: Vec<Message> = Vec::with_capacity(initial.len());

        for message in initial {
            match slots.get(&message.id) {
                Some(&slot) => messages[slot] = message,
                None => {
                    slots.insert(message.id.clone(), messages.len());
                    messages.push(message);
                }
            }
        }
        messages.sort_by_key(|m| m.created_at);

        debug!(channel = %self.channel_id, count = messages.len(), "Loaded messages");
        self.messages = Arc::new(messages);
    }

    /// Replace the server rows with `fresh`, keeping optimistic messages
    /// whose echo is not part of it.
    ///
    /// A pending message that correlates with a fresh row is dropped in
    /// favour of that row. The rest go after the fresh rows, in their
    /// previous order.
    pub fn reload(&mut self, fresh: Vec<Message>) {
        let pending: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.is_local())
            .cloned()
            .collect();
        self.load(fresh);
        if pending.is_empty() {
            return;
        }

        let mut claimed = vec![false; self.messages.len()];
        let mut kept = Vec::new();
        for local in pending {
            let echo = self
                .messages
                .iter()
                .enumerate()
                .position(|(i, m)| !claimed[i] && !m.is_local() && self.correlates(&local, m));
            match echo {
                Some(index) => {
                    claimed[index] = true;
                    let row = &mut self.messages_mut()[index];
                    if row.author.is_none() {
                        row.author = local.author;
                    }
                }
                None => kept.push(local),
            }
        }

        debug!(
            channel = %self.channel_id,
            kept = kept.len(),
            "Kept pending messages across reload"
        );
        self.messages_mut().extend(kept);
    }

    /// Append an optimistic message carrying a local id.
    ///
    /// Returns the local id for later correlation, or `None` if the id is
    /// not a local id or is already present.
    pub fn insert_optimistic(&mut self, message: Message) -> Option<MessageId> {
        if !message.id.is_local() {
            warn!(msg_id = %message.id, "Refusing optimistic insert of a server id");
            return None;
        }
        if self.position(&message.id).is_some() {
            return None;
        }

        let id = message.id.clone();
        trace!(channel = %self.channel_id, msg_id = %id, "Optimistic insert");
        self.messages_mut().push(message);
        Some(id)
    }

    /// Reconcile one change-feed event into the store.
    pub fn apply_server_event(&mut self, event: FeedEvent) -> Applied {
        match event {
            FeedEvent::Insert(record) => self.apply_insert(record),
            FeedEvent::Update { id, patch } => self.apply_update(&id, &patch),
            FeedEvent::Delete(id) => self.apply_delete(&id),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.messages)
    }

    /// Current contents, in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of optimistic messages still waiting for their server echo.
    pub fn pending_local(&self) -> usize {
        self.messages.iter().filter(|m| m.is_local()).count()
    }

    fn apply_insert(&mut self, mut record: Message) -> Applied {
        if record.channel_id != self.channel_id {
            warn!(
                channel = %self.channel_id,
                foreign = %record.channel_id,
                msg_id = %record.id,
                "Dropping insert for another channel"
            );
            return Applied::Foreign(record.channel_id);
        }

        // Re-delivery of a known row: treat as an update.
        if let Some(index) = self.position(&record.id) {
            let existing = &mut self.messages_mut()[index];
            let before = existing.created_at;
            let mut changed = existing.merge(&MessagePatch::from(&record));
            if existing.author.is_none() && record.author.is_some() {
                existing.author = record.author;
                changed = true;
            }
            return self.settle(index, before, changed);
        }

        if let Some(index) = self.find_optimistic_match(&record) {
            let slot = &mut self.messages_mut()[index];
            if record.author.is_none() {
                record.author = slot.author.take();
            }
            let local = std::mem::replace(slot, record);
            debug!(
                channel = %self.channel_id,
                local_id = %local.id,
                msg_id = %self.messages[index].id,
                index,
                "Correlated optimistic message with server echo"
            );
            return Applied::Correlated {
                local_id: local.id,
                index,
            };
        }

        let index = self
            .messages
            .partition_point(|m| m.created_at <= record.created_at);
        trace!(channel = %self.channel_id, msg_id = %record.id, index, "Inserted message");
        self.messages_mut().insert(index, record);
        Applied::Inserted { index }
    }

    fn apply_update(&mut self, id: &MessageId, patch: &MessagePatch) -> Applied {
        let Some(index) = self.position(id) else {
            debug!(channel = %self.channel_id, msg_id = %id, "Update for unknown message ignored");
            return Applied::Missed(id.clone());
        };

        let message = &mut self.messages_mut()[index];
        let before = message.created_at;
        let changed = message.merge(patch);
        self.settle(index, before, changed)
    }

    fn apply_delete(&mut self, id: &MessageId) -> Applied {
        let Some(index) = self.position(id) else {
            debug!(channel = %self.channel_id, msg_id = %id, "Delete for unknown message ignored");
            return Applied::Missed(id.clone());
        };

        self.messages_mut().remove(index);
        Applied::Removed { index }
    }

    /// Oldest optimistic message with the same author, channel and body
    /// whose timestamp lies within the correlation window of `record`.
    fn find_optimistic_match(&self, record: &Message) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.is_local() && self.correlates(m, record))
    }

    fn correlates(&self, local: &Message, record: &Message) -> bool {
        local.author_id == record.author_id
            && local.channel_id == record.channel_id
            && local.body == record.body
            && (local.created_at - record.created_at).abs() <= self.correlation_window
    }

    /// Outcome of a merge at `index`. A message only moves when the merge
    /// changed its timestamp; a correlated echo otherwise keeps its slot even
    /// if its server timestamp is out of order with its neighbours.
    fn settle(&mut self, index: usize, created_before: DateTime<Utc>, changed: bool) -> Applied {
        if self.messages[index].created_at == created_before {
            return Applied::Merged { index, changed };
        }
        let moved_to = self.reposition(index);
        Applied::Merged {
            index: moved_to,
            changed: changed || moved_to != index,
        }
    }

    /// Move the message at `index` if its timestamp no longer sits between
    /// its neighbours. Returns the final index.
    fn reposition(&mut self, index: usize) -> usize {
        let messages = &self.messages;
        let at = messages[index].created_at;
        let after_prev = index == 0 || messages[index - 1].created_at <= at;
        let before_next = index + 1 >= messages.len() || at <= messages[index + 1].created_at;
        if after_prev && before_next {
            return index;
        }

        let messages = self.messages_mut();
        let message = messages.remove(index);
        let target = messages.partition_point(|m| m.created_at <= message.created_at);
        messages.insert(target, message);
        target
    }

    fn messages_mut(&mut self) -> &mut Vec<Message> {
        Arc::make_mut(&mut self.messages)
    }
}
