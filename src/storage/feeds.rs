use super::schema::Database;
use super::types::{DatabaseError, FeedRecord, NewFeed};
use crate::util::normalize_url;

const FEED_COLUMNS: &str =
    "id, feed_address, feed_link, feed_title, active_subscribers, num_subscribers";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Find the canonical feed for a normalized address, creating it if missing.
    ///
    /// New feeds start with one active and one total subscriber. An existing
    /// row is returned untouched. The boolean is `true` when the row was created.
    pub async fn find_or_create_feed(
        &self,
        feed: &NewFeed,
    ) -> Result<(FeedRecord, bool), DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO feeds (feed_address, feed_link, feed_title, active_subscribers, num_subscribers)
            VALUES (?, ?, ?, 1, 1)
            ON CONFLICT(feed_address) DO NOTHING
        "#,
        )
        .bind(&feed.feed_address)
        .bind(&feed.feed_link)
        .bind(&feed.feed_title)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        let record = self
            .feed_by_address(&feed.feed_address)
            .await?
            .ok_or(DatabaseError::Other(sqlx::Error::RowNotFound))?;
        Ok((record, created))
    }

    /// Look up a feed by its exact (already normalized) address.
    pub async fn feed_by_address(&self, address: &str) -> Result<Option<FeedRecord>, DatabaseError> {
        let feed = sqlx::query_as::<_, FeedRecord>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE feed_address = ?"
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Look up a feed by its site link.
    pub async fn feed_by_link(&self, link: &str) -> Result<Option<FeedRecord>, DatabaseError> {
        let feed = sqlx::query_as::<_, FeedRecord>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE feed_link = ? ORDER BY num_subscribers DESC, id LIMIT 1"
        ))
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Resolve an address through the duplicate-address mapping.
    pub async fn find_duplicate_feed(
        &self,
        address: &str,
    ) -> Result<Option<FeedRecord>, DatabaseError> {
        let feed = sqlx::query_as::<_, FeedRecord>(
            r#"
            SELECT f.id, f.feed_address, f.feed_link, f.feed_title,
                   f.active_subscribers, f.num_subscribers
            FROM duplicate_feeds d
            JOIN feeds f ON f.id = d.feed_id
            WHERE d.duplicate_address = ?
            LIMIT 1
        "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Record `address` as an alias of an existing canonical feed.
    pub async fn add_duplicate_address(
        &self,
        address: &str,
        feed_id: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO duplicate_feeds (duplicate_address, feed_id) VALUES (?, ?)")
            .bind(address)
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, address))?;
        Ok(())
    }

    /// Find an existing feed from any URL that might identify it.
    ///
    /// Lookup only: nothing is created. The URL is normalized, then tried as a
    /// feed address, as a duplicate address, and finally as a site link.
    /// Unparseable URLs resolve to `None`.
    pub async fn get_feed_from_url(&self, url: &str) -> Result<Option<FeedRecord>, DatabaseError> {
        let normalized = match normalize_url(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Cannot resolve feed from unparseable URL");
                return Ok(None);
            }
        };

        if let Some(feed) = self.feed_by_address(&normalized).await? {
            return Ok(Some(feed));
        }
        if let Some(feed) = self.find_duplicate_feed(&normalized).await? {
            return Ok(Some(feed));
        }
        self.feed_by_link(&normalized).await
    }

    /// Total number of canonical feeds.
    pub async fn count_feeds(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
