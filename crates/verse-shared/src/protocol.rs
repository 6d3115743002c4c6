use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::MESSAGES_TABLE;
use crate::error::ProtocolError;
use crate::models::{Attachment, Message, SystemKind};
use crate::types::{MessageId, UserId};

/// Row-level change kind reported by the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change-feed envelope as delivered on the wire.
///
/// `new` carries the row after the change (empty object on DELETE), `old`
/// the row before it (at least the primary key on DELETE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// A decoded change to the messages table.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Insert(Message),
    Update { id: MessageId, patch: MessagePatch },
    Delete(MessageId),
}

impl FeedEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update { .. } => ChangeKind::Update,
            Self::Delete(_) => ChangeKind::Delete,
        }
    }

    pub fn id(&self) -> &MessageId {
        match self {
            Self::Insert(m) => &m.id,
            Self::Update { id, .. } => id,
            Self::Delete(id) => id,
        }
    }
}

impl ChangePayload {
    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the envelope into a message event.
    pub fn into_message_event(self) -> Result<FeedEvent, ProtocolError> {
        if self.table != MESSAGES_TABLE {
            return Err(ProtocolError::UnexpectedTable(self.table));
        }

        match self.event_type {
            ChangeKind::Insert => {
                let record =
                    non_empty(self.new).ok_or(ProtocolError::MissingRecord(ChangeKind::Insert))?;
                Ok(FeedEvent::Insert(serde_json::from_value(record)?))
            }
            ChangeKind::Update => {
                let record =
                    non_empty(self.new).ok_or(ProtocolError::MissingRecord(ChangeKind::Update))?;
                let mut patch: MessagePatch = serde_json::from_value(record)?;
                let id = patch.id.take().ok_or(ProtocolError::MissingId)?;
                Ok(FeedEvent::Update { id, patch })
            }
            ChangeKind::Delete => {
                // Some backends only fill `new` on delete; accept either.
                let record = non_empty(self.old)
                    .or_else(|| non_empty(self.new))
                    .ok_or(ProtocolError::MissingRecord(ChangeKind::Delete))?;
                let id = record
                    .get("id")
                    .cloned()
                    .ok_or(ProtocolError::MissingId)?;
                Ok(FeedEvent::Delete(serde_json::from_value(id)?))
            }
        }
    }
}

fn non_empty(value: Option<Value>) -> Option<Value> {
    value.filter(|v| match v {
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
        _ => true,
    })
}

/// Partial message record used for UPDATE events and update requests.
///
/// The outer `Option` says whether the field was present at all; the inner
/// one carries an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing)]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    #[serde(
        rename = "parent_message_id",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<MessageId>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub body: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Option<Vec<Attachment>>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub system_kind: Option<Option<SystemKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl MessagePatch {
    /// Patch for a user edit of the message body.
    pub fn edit(body: String, at: DateTime<Utc>) -> Self {
        Self {
            body: Some(Some(body)),
            edited_at: Some(Some(at)),
            ..Default::default()
        }
    }
}

impl From<&Message> for MessagePatch {
    /// Every field of `message` except the joined author.
    fn from(message: &Message) -> Self {
        Self {
            id: Some(message.id.clone()),
            author_id: Some(message.author_id),
            parent_id: Some(message.parent_id.clone()),
            body: Some(message.body.clone()),
            attachments: Some(message.attachments.clone()),
            system_kind: Some(message.system_kind),
            created_at: Some(message.created_at),
            edited_at: Some(message.edited_at),
            deleted_at: Some(message.deleted_at),
        }
    }
}

/// Present-but-null becomes `Some(None)`; absence is handled by `default`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
