use thiserror::Error;

use crate::protocol::ChangeKind;
use crate::types::MessageId;

/// Errors surfaced by the chat view. None of them is fatal to the process;
/// all are recoverable at channel-view scope.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Change feed disconnected")]
    FeedDisconnected,

    #[error("Change feed subscription failed: {0}")]
    Subscribe(String),

    #[error("No message with id {0}")]
    CorrelationMiss(MessageId),

    #[error("Summary request failed: {0}")]
    SummaryFailed(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel view has been torn down")]
    TornDown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Attachment too large: {size} bytes (max {max})")]
    AttachmentTooLarge { size: usize, max: usize },

    #[error("Message cannot be edited: {0}")]
    NotEditable(&'static str),

    #[error("Cannot reply here: {0}")]
    InvalidParent(&'static str),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected table in change payload: {0}")]
    UnexpectedTable(String),

    #[error("{0:?} event carries no record")]
    MissingRecord(ChangeKind),

    #[error("Record carries no id")]
    MissingId,
}
