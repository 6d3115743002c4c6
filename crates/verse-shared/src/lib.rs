//! # verse-shared
//!
//! Types shared by every verse crate: identifiers, the message and channel
//! models, the change-feed wire envelope and the error taxonomy.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::{ChatError, ProtocolError, ValidationError};
pub use models::*;
pub use protocol::{ChangeKind, ChangePayload, FeedEvent, MessagePatch};
pub use types::{ChannelId, MessageId, UserId, VerseId};
