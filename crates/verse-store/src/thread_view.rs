//! Thread partitioning over a message list.
//!
//! Threads are one level deep: a message is either a root (no parent) or a
//! reply to a root. The projection is recomputed on every read; a channel's
//! message count is small enough that a linear scan is cheaper than keeping
//! a secondary index in sync.

use verse_shared::{Message, MessageId};

/// Which slice of the channel a view is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ThreadFilter {
    /// Root messages only.
    #[default]
    Root,
    /// Replies to the given root message.
    Replies(MessageId),
}

impl ThreadFilter {
    /// The active parent id, `None` for the root view.
    pub fn parent(&self) -> Option<&MessageId> {
        match self {
            Self::Root => None,
            Self::Replies(id) => Some(id),
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.parent_id.as_ref() == self.parent()
    }
}

impl From<Option<MessageId>> for ThreadFilter {
    fn from(parent: Option<MessageId>) -> Self {
        match parent {
            Some(id) => Self::Replies(id),
            None => Self::Root,
        }
    }
}

/// Messages visible under `filter`, in store order.
pub fn project<'a>(messages: &'a [Message], filter: &ThreadFilter) -> Vec<&'a Message> {
    messages.iter().filter(|m| filter.matches(m)).collect()
}

/// Number of replies to `id`.
pub fn reply_count(messages: &[Message], id: &MessageId) -> usize {
    messages
        .iter()
        .filter(|m| m.parent_id.as_ref() == Some(id))
        .count()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use chrono::Utc;
    use uuid::Uuid;
    use verse_shared::{ChannelId, UserId};

    use super::*;

    fn msg(id: &str, parent: Option<&str>) -> Message {
        Message {
            id: MessageId::from(id),
            channel_id: ChannelId(Uuid::nil()),
            author_id: UserId(Uuid::nil()),
            author: None,
            parent_id: parent.map(MessageId::from),
            body: None,
            attachments: None,
            system_kind: None,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        }
    }

    fn channel() -> Vec<Message> {
        vec![
            msg("r1", None),
            msg("a", Some("r1")),
            msg("r2", None),
            msg("b", Some("r2")),
            msg("c", Some("r1")),
        ]
    }

    fn ids(view: &[&Message]) -> Vec<String> {
        view.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn root_view_shows_only_roots() {
        let messages = channel();
        let view = project(&messages, &ThreadFilter::Root);
        assert_eq!(ids(&view), ["r1", "r2"]);
        assert!(view.iter().all(|m| m.parent_id.is_none()));
    }

    #[test]
    fn reply_view_keeps_store_order() {
        let messages = channel();
        let view = project(&messages, &ThreadFilter::Replies("r1".into()));
        assert_eq!(ids(&view), ["a", "c"]);
    }

    #[test]
    fn replies_are_not_thread_targets() {
        let messages = channel();
        assert!(project(&messages, &ThreadFilter::Replies("a".into())).is_empty());
    }

    #[test]
    fn projection_partitions_the_store() {
        let messages = channel();
        let parents: BTreeSet<Option<MessageId>> =
            messages.iter().map(|m| m.parent_id.clone()).collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for parent in parents {
            let filter = ThreadFilter::from(parent.clone());
            for m in project(&messages, &filter) {
                assert_eq!(m.parent_id, parent);
                assert!(seen.insert(m.id.clone()), "{} projected twice", m.id);
                total += 1;
            }
        }
        assert_eq!(total, messages.len());
    }

    #[test]
    fn counts_replies() {
        let messages = channel();
        assert_eq!(reply_count(&messages, &"r1".into()), 2);
        assert_eq!(reply_count(&messages, &"r2".into()), 1);
        assert_eq!(reply_count(&messages, &"b".into()), 0);
    }
}
