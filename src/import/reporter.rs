use std::sync::Mutex;
use thiserror::Error;

use crate::util::truncate_chars;

/// Longest story title echoed in log lines.
const LOGGED_TITLE_CHARS: usize = 50;

/// Why an entry was left out of an import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("feed address is {len} characters (max {max})")]
    AddressTooLong { len: usize, max: usize },

    #[error("feed link is {len} characters (max {max})")]
    LinkTooLong { len: usize, max: usize },

    #[error("feed address is not a usable URL: {0}")]
    InvalidAddress(String),

    #[error("entry has no feed address")]
    MissingAddress,
}

/// Something noteworthy that happened while importing for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    SubscriptionsCleared { count: u64 },
    FeedSubscribed { feed_id: i64, title: String, new_feed: bool },
    FeedSkipped { address: String, reason: SkipReason },
    FeedFailed { address: String, error: String },
    FoldersSaved { feeds: usize, folders: usize },
    /// The user already had a folder tree, which was left as is.
    FoldersKept,
    /// The subscription list could not be fetched.
    NoSubscriptionList,
    /// The starred stream was missing or undecodable.
    NoStories,
    StoriesFetched { count: usize },
    StoryStarred { title: String, feed_id: Option<i64> },
    AlreadyStarred { title: String },
    StarFailed { title: String, error: String },
}

/// Receives import progress. Importers never log directly.
pub trait ImportReporter: Send + Sync {
    fn report(&self, user_id: i64, event: &ImportEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ImportReporter for TracingReporter {
    fn report(&self, user_id: i64, event: &ImportEvent) {
        match event {
            ImportEvent::SubscriptionsCleared { count } => {
                tracing::debug!(user_id, count, "Cleared existing subscriptions");
            }
            ImportEvent::FeedSubscribed {
                feed_id,
                title,
                new_feed,
            } => {
                tracing::debug!(user_id, feed_id, title = %title, new_feed, "Subscribed to feed");
            }
            ImportEvent::FeedSkipped { address, reason } => {
                tracing::info!(user_id, address = %address, reason = %reason, "Skipping feed");
            }
            ImportEvent::FeedFailed { address, error } => {
                tracing::warn!(user_id, address = %address, error = %error, "Failed to import feed");
            }
            ImportEvent::FoldersSaved { feeds, folders } => {
                tracing::info!(user_id, feeds, folders, "Saved folder tree");
            }
            ImportEvent::FoldersKept => {
                tracing::info!(user_id, "Existing folder tree kept");
            }
            ImportEvent::NoSubscriptionList => {
                tracing::info!(user_id, "Reader subscriptions: no subscription list");
            }
            ImportEvent::NoStories => {
                tracing::info!(user_id, "Reader starred stories: no stories");
            }
            ImportEvent::StoriesFetched { count } => {
                tracing::info!(user_id, count, "Reader starred stories fetched");
            }
            ImportEvent::StoryStarred { title, feed_id } => {
                tracing::debug!(
                    user_id,
                    title = %truncate_chars(title, LOGGED_TITLE_CHARS),
                    feed_id = ?feed_id,
                    "Starring"
                );
            }
            ImportEvent::AlreadyStarred { title } => {
                tracing::debug!(
                    user_id,
                    title = %truncate_chars(title, LOGGED_TITLE_CHARS),
                    "Already starred"
                );
            }
            ImportEvent::StarFailed { title, error } => {
                tracing::warn!(
                    user_id,
                    title = %truncate_chars(title, LOGGED_TITLE_CHARS),
                    error = %error,
                    "Failed to star"
                );
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(i64, ImportEvent)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events reported so far, in order.
    pub fn events(&self) -> Vec<ImportEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn events_for(&self, user_id: i64) -> Vec<ImportEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(id, _)| *id == user_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl ImportReporter for MemoryReporter {
    fn report(&self, user_id: i64, event: &ImportEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((user_id, event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_keeps_order_per_user() {
        let reporter = MemoryReporter::new();
        reporter.report(1, &ImportEvent::NoStories);
        reporter.report(2, &ImportEvent::FoldersKept);
        reporter.report(1, &ImportEvent::StoriesFetched { count: 3 });

        assert_eq!(reporter.events().len(), 3);
        assert_eq!(
            reporter.events_for(1),
            vec![ImportEvent::NoStories, ImportEvent::StoriesFetched { count: 3 }]
        );
    }

    #[test]
    fn test_skip_reason_messages() {
        let reason = SkipReason::AddressTooLong { len: 300, max: 255 };
        assert_eq!(reason.to_string(), "feed address is 300 characters (max 255)");
    }

    #[test]
    fn test_tracing_reporter_accepts_every_event() {
        let reporter = TracingReporter;
        reporter.report(
            1,
            &ImportEvent::StarFailed {
                title: "x".repeat(200),
                error: "boom".to_string(),
            },
        );
        reporter.report(1, &ImportEvent::FoldersKept);
    }
}
