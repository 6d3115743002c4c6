#![allow(dead_code)]

//! In-memory backend implementing every collaborator, for driving a
//! channel view end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use verse_client::{
    BlobStorage, ChangeFeed, ClientConfig, Collaborators, FeedSignal, FeedSubscription,
    Persistence, StaticAuth, SummaryTrigger,
};
use verse_shared::{
    Actor, ChangeKind, ChangePayload, Channel, ChannelId, ChannelKind, ChatError, Message,
    MessageId, MessagePatch, NewChannel, NewMessage, UserId, VerseId,
};

pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn actor() -> Actor {
    Actor {
        id: UserId(Uuid::from_u128(1)),
        display_name: Some("ana".into()),
    }
}

pub fn config() -> Arc<ClientConfig> {
    Arc::new(ClientConfig {
        reload_attempts: 2,
        reload_backoff: Duration::from_millis(1),
        max_attachment_size: 16,
        ..ClientConfig::default()
    })
}

pub fn row(id: &str, channel: ChannelId, at: DateTime<Utc>) -> Message {
    Message {
        id: MessageId::from(id),
        channel_id: channel,
        author_id: UserId(Uuid::from_u128(2)),
        author: None,
        parent_id: None,
        body: Some(format!("body of {id}")),
        attachments: None,
        system_kind: None,
        created_at: at,
        edited_at: None,
        deleted_at: None,
    }
}

pub fn insert_payload(record: &Message) -> FeedSignal {
    FeedSignal::Change(ChangePayload {
        event_type: ChangeKind::Insert,
        schema: "public".into(),
        table: "messages".into(),
        new: Some(serde_json::to_value(record).unwrap()),
        old: None,
    })
}

pub fn update_payload(id: &MessageId, patch: &MessagePatch) -> FeedSignal {
    let mut new = serde_json::to_value(patch).unwrap();
    new["id"] = json!(id);
    FeedSignal::Change(ChangePayload {
        event_type: ChangeKind::Update,
        schema: "public".into(),
        table: "messages".into(),
        new: Some(new),
        old: None,
    })
}

pub fn delete_payload(id: &MessageId) -> FeedSignal {
    FeedSignal::Change(ChangePayload {
        event_type: ChangeKind::Delete,
        schema: "public".into(),
        table: "messages".into(),
        new: Some(json!({})),
        old: Some(json!({ "id": id })),
    })
}

#[derive(Default)]
struct Inner {
    rows: Vec<Message>,
    channels: Vec<Channel>,
    feeds: Vec<(String, mpsc::Sender<FeedSignal>)>,
    subscribes: usize,
    selects: usize,
    fail_selects: usize,
    fail_subscribes: usize,
    reject_inserts: bool,
    during_select: Vec<(String, FeedSignal)>,
    inserted: Vec<NewMessage>,
    updates: Vec<(MessageId, MessagePatch)>,
    uploads: Vec<(String, usize)>,
    summaries: Vec<(ChannelId, Option<MessageId>)>,
    fail_summary: bool,
    new_channels: Vec<NewChannel>,
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    releases: Arc<AtomicUsize>,
    /// `true` while inserts may complete.
    gate: watch::Sender<bool>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            releases: Arc::new(AtomicUsize::new(0)),
            gate,
        })
    }

    pub fn collaborators(self: &Arc<Self>, auth: StaticAuth) -> Collaborators {
        Collaborators {
            persistence: self.clone(),
            feed: self.clone(),
            auth: Arc::new(auth),
            blobs: self.clone(),
            summary: self.clone(),
        }
    }

    pub fn seed(&self, rows: Vec<Message>) {
        self.inner.lock().unwrap().rows = rows;
    }

    pub fn seed_channels(&self, channels: Vec<Channel>) {
        self.inner.lock().unwrap().channels = channels;
    }

    /// Deliver `signal` on the newest subscription for `topic`. Signals for
    /// a released subscription are dropped.
    pub fn push(&self, topic: &str, signal: FeedSignal) {
        let inner = self.inner.lock().unwrap();
        if let Some((_, tx)) = inner.feeds.iter().rev().find(|(t, _)| t == topic) {
            let _ = tx.try_send(signal);
        }
    }

    /// Queue `signal` to be delivered on `topic` while the next select runs.
    pub fn during_select(&self, topic: &str, signal: FeedSignal) {
        self.inner
            .lock()
            .unwrap()
            .during_select
            .push((topic.to_string(), signal));
    }

    /// Drop the sending side of every subscription on `topic`.
    pub fn close_feed(&self, topic: &str) {
        self.inner.lock().unwrap().feeds.retain(|(t, _)| t != topic);
    }

    pub fn hold_inserts(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_inserts(&self) {
        self.gate.send_replace(true);
    }

    pub fn reject_inserts(&self) {
        self.inner.lock().unwrap().reject_inserts = true;
    }

    pub fn fail_selects(&self, n: usize) {
        self.inner.lock().unwrap().fail_selects = n;
    }

    pub fn fail_subscribes(&self, n: usize) {
        self.inner.lock().unwrap().fail_subscribes = n;
    }

    pub fn fail_summary(&self) {
        self.inner.lock().unwrap().fail_summary = true;
    }

    pub fn selects(&self) -> usize {
        self.inner.lock().unwrap().selects
    }

    pub fn subscribes(&self) -> usize {
        self.inner.lock().unwrap().subscribes
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> Vec<NewMessage> {
        self.inner.lock().unwrap().inserted.clone()
    }

    pub fn updates(&self) -> Vec<(MessageId, MessagePatch)> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.inner.lock().unwrap().uploads.clone()
    }

    pub fn summaries(&self) -> Vec<(ChannelId, Option<MessageId>)> {
        self.inner.lock().unwrap().summaries.clone()
    }

    pub fn new_channels(&self) -> Vec<NewChannel> {
        self.inner.lock().unwrap().new_channels.clone()
    }

    /// Messages the backend would return for `channel` right now.
    pub fn fresh_load(&self, channel: ChannelId) -> Vec<Message> {
        let mut rows: Vec<Message> = self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|m| m.channel_id == channel)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        rows
    }

    /// Wait until held inserts are released.
    async fn pass_gate(&self) {
        let mut gate = self.gate.subscribe();
        while !*gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }
    }

    fn open(&self, topic: String) -> Result<FeedSubscription, ChatError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_subscribes > 0 {
            inner.fail_subscribes -= 1;
            return Err(ChatError::Subscribe("realtime unavailable".into()));
        }
        inner.subscribes += 1;

        let (tx, rx) = mpsc::channel(64);
        inner.feeds.push((topic.clone(), tx));
        let releases = self.releases.clone();
        Ok(FeedSubscription::new(topic, rx, move || {
            releases.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, channel: ChannelId) -> Result<FeedSubscription, ChatError> {
        self.open(channel.to_topic())
    }

    async fn subscribe_directory(&self, verse: VerseId) -> Result<FeedSubscription, ChatError> {
        self.open(format!("channels-{verse}"))
    }
}

#[async_trait]
impl Persistence for MemoryBackend {
    async fn select_messages(&self, channel: ChannelId) -> Result<Vec<Message>, ChatError> {
        let queued = {
            let mut inner = self.inner.lock().unwrap();
            inner.selects += 1;
            if inner.fail_selects > 0 {
                inner.fail_selects -= 1;
                return Err(ChatError::Persistence("connection reset".into()));
            }
            std::mem::take(&mut inner.during_select)
        };
        for (topic, signal) in queued {
            self.push(&topic, signal);
        }
        Ok(self.fresh_load(channel))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.inserted.push(message.clone());
            inner.reject_inserts
        };
        if rejected {
            self.pass_gate().await;
            return Err(ChatError::Persistence(
                "new row violates row-level security policy".into(),
            ));
        }

        let record = {
            let mut inner = self.inner.lock().unwrap();
            let record = Message {
                id: MessageId::from(Uuid::new_v4()),
                channel_id: message.channel_id,
                author_id: message.author_id,
                author: None,
                parent_id: message.parent_id,
                body: message.body,
                attachments: message.attachments,
                system_kind: None,
                created_at: Utc::now(),
                edited_at: None,
                deleted_at: None,
            };
            inner.rows.push(record.clone());
            record
        };

        // The change feed echoes the row before the insert call returns.
        self.push(&record.channel_id.to_topic(), insert_payload(&record));

        self.pass_gate().await;
        Ok(record)
    }

    async fn update_message(&self, id: &MessageId, patch: &MessagePatch) -> Result<(), ChatError> {
        let topic = {
            let mut inner = self.inner.lock().unwrap();
            inner.updates.push((id.clone(), patch.clone()));
            let row = inner
                .rows
                .iter_mut()
                .find(|m| &m.id == id)
                .ok_or_else(|| ChatError::Persistence("no such row".into()))?;
            row.merge(patch);
            row.channel_id.to_topic()
        };
        self.push(&topic, update_payload(id, patch));
        Ok(())
    }

    async fn list_channels(&self, verse: VerseId) -> Result<Vec<Channel>, ChatError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|c| c.verse_id == verse)
            .cloned()
            .collect())
    }

    async fn insert_channel(&self, channel: NewChannel) -> Result<Channel, ChatError> {
        let created = Channel {
            id: ChannelId::new(),
            verse_id: channel.verse_id,
            name: channel.name.clone(),
            kind: channel.kind,
            ttl_hours: channel.ttl_hours,
            created_by: Some(channel.created_by),
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.new_channels.push(channel);
        inner.channels.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl BlobStorage for MemoryBackend {
    async fn upload(&self, path: &str, bytes: Bytes) -> Result<String, ChatError> {
        self.inner
            .lock()
            .unwrap()
            .uploads
            .push((path.to_string(), bytes.len()));
        Ok(format!("https://blobs.test/attachments/{path}"))
    }
}

#[async_trait]
impl SummaryTrigger for MemoryBackend {
    async fn request_summary(
        &self,
        channel: ChannelId,
        thread: Option<&MessageId>,
    ) -> Result<(), ChatError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_summary {
            return Err(ChatError::SummaryFailed("500 Internal Server Error".into()));
        }
        inner.summaries.push((channel, thread.cloned()));
        Ok(())
    }
}

pub fn channel(verse: VerseId, name: &str, kind: ChannelKind, at: DateTime<Utc>) -> Channel {
    Channel {
        id: ChannelId::new(),
        verse_id: verse,
        name: name.to_string(),
        kind,
        ttl_hours: None,
        created_by: None,
        created_at: at,
    }
}
