use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::LOCAL_ID_PREFIX;

/// Identifier of a message within a channel.
///
/// Two flavours share this type: server ids assigned by the backing store
/// (UUID text) and local ids minted on the client for optimistic inserts.
/// Local ids always start with [`LOCAL_ID_PREFIX`], which a UUID never does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Mint a fresh local id for an optimistic message.
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the realtime topic carrying this channel's message changes.
    pub fn to_topic(&self) -> String {
        format!("msgs-{}", self.0)
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workspace grouping channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VerseId(pub Uuid);

impl VerseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
