//! # verse-client
//!
//! Client-side view of one chat channel.
//!
//! The [`Compositor`] owns a channel's [`MessageStore`], feeds it the initial
//! load, optimistic sends and change-feed events, and hands read-only
//! thread views to the presentation layer. Everything it talks to (storage,
//! change feed, auth, blobs, summaries) is injected through the traits in
//! [`collaborators`] and [`feed`].
//!
//! [`MessageStore`]: verse_store::MessageStore

pub mod collaborators;
pub mod compositor;
pub mod config;
pub mod directory;
pub mod events;
pub mod feed;
pub mod rest;
pub mod state;
pub mod telemetry;

pub use collaborators::{Auth, BlobStorage, Collaborators, Persistence, StaticAuth, SummaryTrigger};
pub use compositor::Compositor;
pub use config::ClientConfig;
pub use directory::ChannelDirectory;
pub use events::ViewEvent;
pub use feed::{ChangeFeed, FeedSignal, FeedSubscription};
pub use rest::RestBackend;
pub use state::ViewState;
