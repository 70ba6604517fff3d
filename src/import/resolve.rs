//! Feed resolution shared by the importers.

use crate::config::Config;
use crate::storage::{Database, DatabaseError, FeedRecord, NewFeed, NewSubscription, Subscription};
use crate::util::{normalize_optional_url, normalize_url};

use super::reporter::SkipReason;

/// Stories older than this are treated as read on a fresh subscription.
const MARK_READ_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Storage limits for feed URLs, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub max_address_len: usize,
    pub max_link_len: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FeedLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_address_len: config.max_feed_address_len,
            max_link_len: config.max_feed_link_len,
        }
    }
}

/// A feed as described by an import document, before normalization.
#[derive(Debug)]
pub(crate) struct FeedCandidate<'a> {
    pub address: &'a str,
    pub link: Option<&'a str>,
    pub title: &'a str,
}

#[derive(Debug)]
pub(crate) enum Resolution {
    Feed { record: FeedRecord, created: bool },
    Skipped(SkipReason),
}

/// Normalize a candidate and map it to its canonical feed.
///
/// The duplicate-address table wins over the feed table; a feed is created
/// only when neither knows the address. A link that does not normalize is
/// dropped rather than failing the entry.
pub(crate) async fn resolve_feed(
    db: &Database,
    limits: FeedLimits,
    candidate: &FeedCandidate<'_>,
) -> Result<Resolution, DatabaseError> {
    let address = match normalize_url(candidate.address) {
        Ok(address) => address,
        Err(e) => return Ok(Resolution::Skipped(SkipReason::InvalidAddress(e.to_string()))),
    };
    let link = normalize_optional_url(candidate.link).unwrap_or_else(|e| {
        tracing::debug!(link = ?candidate.link, error = %e, "Dropping unusable feed link");
        None
    });

    let address_len = address.chars().count();
    if address_len > limits.max_address_len {
        return Ok(Resolution::Skipped(SkipReason::AddressTooLong {
            len: address_len,
            max: limits.max_address_len,
        }));
    }
    if let Some(link) = &link {
        let link_len = link.chars().count();
        if link_len > limits.max_link_len {
            return Ok(Resolution::Skipped(SkipReason::LinkTooLong {
                len: link_len,
                max: limits.max_link_len,
            }));
        }
    }

    if let Some(record) = db.find_duplicate_feed(&address).await? {
        return Ok(Resolution::Feed {
            record,
            created: false,
        });
    }

    let (record, created) = db
        .find_or_create_feed(&NewFeed {
            feed_address: address,
            feed_link: link,
            feed_title: candidate.title.to_owned(),
        })
        .await?;
    Ok(Resolution::Feed { record, created })
}

/// Get or create the subscription and leave it flagged for an unread recount.
///
/// With `activate`, an existing inactive subscription is switched on.
pub(crate) async fn subscribe(
    db: &Database,
    user_id: i64,
    feed_id: i64,
    active: bool,
    user_title: Option<String>,
    activate: bool,
) -> Result<Subscription, DatabaseError> {
    let defaults = NewSubscription {
        active,
        user_title,
        mark_read_date: chrono::Utc::now().timestamp() - MARK_READ_WINDOW_SECS,
    };
    let (mut subscription, _) = db.get_or_create_subscription(user_id, feed_id, &defaults).await?;

    if activate && !subscription.active {
        db.activate_subscription(subscription.id).await?;
        subscription.active = true;
    }
    if !subscription.needs_unread_recalc {
        db.flag_unread_recalc(subscription.id).await?;
        subscription.needs_unread_recalc = true;
    }
    Ok(subscription)
}
