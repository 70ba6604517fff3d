use super::schema::Database;
use super::types::{DatabaseError, NewSubscription, SubscribedFeed, Subscription};

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, feed_id, active, user_title, needs_unread_recalc, mark_read_date";

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Delete every subscription the user has. Returns the number removed.
    pub async fn clear_subscriptions(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM user_subscriptions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Get the (user, feed) subscription, creating it with `defaults` if missing.
    ///
    /// New rows are always flagged for unread recalculation. An existing row is
    /// returned unchanged; the boolean is `true` when the row was created.
    pub async fn get_or_create_subscription(
        &self,
        user_id: i64,
        feed_id: i64,
        defaults: &NewSubscription,
    ) -> Result<(Subscription, bool), DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_subscriptions
                (user_id, feed_id, active, user_title, needs_unread_recalc, mark_read_date)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(user_id, feed_id) DO NOTHING
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(defaults.active)
        .bind(&defaults.user_title)
        .bind(defaults.mark_read_date)
        .execute(&self.pool)
        .await?;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM user_subscriptions WHERE user_id = ? AND feed_id = ?"
        ))
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((subscription, result.rows_affected() > 0))
    }

    pub async fn activate_subscription(&self, subscription_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE user_subscriptions SET active = 1 WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flag a subscription so its unread counts get recomputed.
    pub async fn flag_unread_recalc(&self, subscription_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE user_subscriptions SET needs_unread_recalc = 1 WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All of a user's subscriptions, ordered by feed id.
    pub async fn subscriptions_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM user_subscriptions WHERE user_id = ? ORDER BY feed_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    /// A user's subscriptions joined with their canonical feeds.
    pub async fn subscribed_feeds(&self, user_id: i64) -> Result<Vec<SubscribedFeed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, SubscribedFeed>(
            r#"
            SELECT f.id AS feed_id, f.feed_address, f.feed_link, f.feed_title,
                   s.user_title, s.active
            FROM user_subscriptions s
            JOIN feeds f ON f.id = s.feed_id
            WHERE s.user_id = ?
            ORDER BY f.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn count_subscriptions(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_subscriptions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
