//! Domain models exchanged with the backing store.
//!
//! Field names follow the database columns (snake_case) so rows from the
//! initial select and records from the change feed deserialize directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::MessagePatch;
use crate::types::{ChannelId, MessageId, UserId, VerseId};

// ---------------------------------------------------------------------------
// Actor / author
// ---------------------------------------------------------------------------

/// The authenticated user on whose behalf the client acts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: Option<String>,
}

/// Denormalised author info joined onto a message. May be absent or stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<&Actor> for Author {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id,
            display_name: actor.display_name.clone(),
            avatar_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An uploaded file referenced by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    /// Size in bytes. Named `size` on the wire.
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
}

/// Marks messages synthesised by the system rather than typed by a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemKind {
    Summary,
    System,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    /// Root message this one replies to. `None` for root messages.
    #[serde(rename = "parent_message_id", default)]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub system_kind: Option<SystemKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build the optimistic copy of a message the local actor is sending.
    pub fn optimistic(
        channel_id: ChannelId,
        actor: &Actor,
        parent_id: Option<MessageId>,
        body: String,
    ) -> Self {
        Self {
            id: MessageId::local(),
            channel_id,
            author_id: actor.id,
            author: Some(Author::from(actor)),
            parent_id,
            body: Some(body),
            attachments: None,
            system_kind: None,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_system(&self) -> bool {
        self.system_kind.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Name to show next to the message: the author's display name, or the
    /// author id when no profile is attached.
    pub fn author_label(&self) -> String {
        self.author
            .as_ref()
            .and_then(|a| a.display_name.clone())
            .unwrap_or_else(|| self.author_id.to_string())
    }

    /// Shallow-merge `patch` onto this message.
    ///
    /// Only fields present in the patch are written. The channel and the
    /// joined author are never touched, and a parent id that is already set
    /// is kept. Returns `true` if anything changed.
    pub fn merge(&mut self, patch: &MessagePatch) -> bool {
        let before = self.clone();

        if let Some(author_id) = patch.author_id {
            self.author_id = author_id;
        }
        if let Some(parent_id) = &patch.parent_id {
            if self.parent_id.is_none() {
                self.parent_id = parent_id.clone();
            }
        }
        if let Some(body) = &patch.body {
            self.body = body.clone();
        }
        if let Some(attachments) = &patch.attachments {
            self.attachments = attachments.clone();
        }
        if let Some(system_kind) = patch.system_kind {
            self.system_kind = system_kind;
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        if let Some(edited_at) = patch.edited_at {
            self.edited_at = edited_at;
        }
        if let Some(deleted_at) = patch.deleted_at {
            self.deleted_at = deleted_at;
        }

        *self != before
    }
}

/// Insert payload for a new message row. The store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewMessage {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    #[serde(rename = "parent_message_id")]
    pub parent_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Time-limited room.
    Room,
    /// Persistent topic channel. Unknown kinds fall back to this.
    #[serde(other)]
    Topic,
}

/// A named message stream within a verse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub verse_id: VerseId,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default)]
    pub ttl_hours: Option<u32>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Sidebar label: rooms get a clock, topics a hash.
    pub fn label(&self) -> String {
        match self.kind {
            ChannelKind::Room => format!("🕒 {}", self.name),
            ChannelKind::Topic => format!("# {}", self.name),
        }
    }
}

/// Insert payload for a new channel row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewChannel {
    pub verse_id: VerseId,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
    pub created_by: UserId,
}
