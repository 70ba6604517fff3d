use secrecy::SecretString;
use thiserror::Error;

use crate::feed::FolderTree;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The subscription database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A unique constraint rejected the row (already exists)
    #[error("Record already exists: {0}")]
    Duplicate(String),

    /// A stored JSON document could not be encoded or decoded
    #[error("Stored document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, picking out lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Map unique-constraint violations to [`DatabaseError::Duplicate`].
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::Duplicate(what.to_owned())
            }
            _ => DatabaseError::from_sqlx(err),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// An account that owns subscriptions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Paid tier: new subscriptions start active.
    pub is_premium: bool,
}

/// Canonical feed record, keyed by normalized address.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedRecord {
    pub id: i64,
    pub feed_address: String,
    pub feed_link: Option<String>,
    pub feed_title: String,
    pub active_subscribers: i64,
    pub num_subscribers: i64,
}

/// Values used when a feed lookup has to create the record.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub feed_address: String,
    pub feed_link: Option<String>,
    pub feed_title: String,
}

/// A user's subscription to a feed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub active: bool,
    /// Custom title override; `None` means the feed's own title is shown.
    pub user_title: Option<String>,
    /// Unread counts must be recomputed by the unread counter.
    pub needs_unread_recalc: bool,
    /// Unix timestamp; stories older than this count as read.
    pub mark_read_date: i64,
}

/// Defaults applied when a subscription row is first created.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub active: bool,
    pub user_title: Option<String>,
    pub mark_read_date: i64,
}

/// A subscription joined with its feed, as shown to the user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscribedFeed {
    pub feed_id: i64,
    pub feed_address: String,
    pub feed_link: Option<String>,
    pub feed_title: String,
    pub user_title: Option<String>,
    pub active: bool,
}

impl SubscribedFeed {
    /// Title to display: the user's override when set.
    pub fn display_title(&self) -> &str {
        self.user_title.as_deref().unwrap_or(&self.feed_title)
    }
}

/// A user's folder layout.
#[derive(Debug, Clone)]
pub struct UserFolders {
    pub user_id: i64,
    pub folders: FolderTree,
}

/// Snapshot of a remote starred story ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStarredStory {
    pub user_id: i64,
    pub starred_date: i64,
    pub story_date: i64,
    pub story_title: String,
    pub story_permalink: String,
    pub story_guid: String,
    pub story_content: Option<String>,
    pub story_author_name: Option<String>,
    pub story_feed_id: Option<i64>,
    pub story_tags: Vec<String>,
}

/// Stored starred story.
#[derive(Debug, Clone)]
pub struct StarredStory {
    pub id: i64,
    pub user_id: i64,
    pub starred_date: i64,
    pub story_date: i64,
    pub story_title: String,
    pub story_permalink: String,
    pub story_guid: String,
    pub story_content: Option<String>,
    pub story_author_name: Option<String>,
    pub story_feed_id: Option<i64>,
    pub story_tags: Vec<String>,
}

/// Row type for starred story queries; tags are stored as a JSON array.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StarredStoryRow {
    pub id: i64,
    pub user_id: i64,
    pub starred_date: i64,
    pub story_date: i64,
    pub story_title: String,
    pub story_permalink: String,
    pub story_guid: String,
    pub story_content: Option<String>,
    pub story_author_name: Option<String>,
    pub story_feed_id: Option<i64>,
    pub story_tags: String,
}

impl StarredStoryRow {
    pub(crate) fn into_story(self) -> Result<StarredStory, DatabaseError> {
        Ok(StarredStory {
            id: self.id,
            user_id: self.user_id,
            starred_date: self.starred_date,
            story_date: self.story_date,
            story_title: self.story_title,
            story_permalink: self.story_permalink,
            story_guid: self.story_guid,
            story_content: self.story_content,
            story_author_name: self.story_author_name,
            story_feed_id: self.story_feed_id,
            story_tags: serde_json::from_str(&self.story_tags)?,
        })
    }
}

/// Stored reader-service credential.
///
/// The secrets never appear in `Debug` output (`SecretString` redacts them).
#[derive(Debug)]
pub struct OAuthCredential {
    pub access_token: SecretString,
    pub token_secret: SecretString,
    /// Unix timestamp after which the token is no longer accepted.
    pub expires_at: Option<i64>,
}

impl OAuthCredential {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An archived OPML upload.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UploadedOpml {
    pub id: i64,
    pub user_id: i64,
    pub opml_file: String,
    pub upload_date: i64,
}
