//! # verse-store
//!
//! In-memory message state for one channel view.
//!
//! [`MessageStore`] keeps the ordered, de-duplicated list of messages and
//! reconciles the initial load, optimistic local sends and change-feed
//! events into it. [`thread_view`] projects that list into root messages or
//! the replies of one root without holding any state of its own.

pub mod message_store;
pub mod thread_view;

pub use message_store::{Applied, MessageStore, Snapshot};
pub use thread_view::{project, reply_count, ThreadFilter};
