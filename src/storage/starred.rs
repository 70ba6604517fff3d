use super::schema::Database;
use super::types::{DatabaseError, NewStarredStory, StarredStory, StarredStoryRow};

impl Database {
    // ========================================================================
    // Starred Story Operations
    // ========================================================================

    /// Insert a starred story snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Duplicate`] when the user already starred a
    /// story with the same guid.
    pub async fn create_starred_story(&self, story: &NewStarredStory) -> Result<i64, DatabaseError> {
        let tags = serde_json::to_string(&story.story_tags)?;
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO starred_stories (
                user_id, starred_date, story_date, story_title, story_permalink,
                story_guid, story_content, story_author_name, story_feed_id, story_tags
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(story.user_id)
        .bind(story.starred_date)
        .bind(story.story_date)
        .bind(&story.story_title)
        .bind(&story.story_permalink)
        .bind(&story.story_guid)
        .bind(&story.story_content)
        .bind(&story.story_author_name)
        .bind(story.story_feed_id)
        .bind(&tags)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_insert(e, &story.story_guid))?;
        Ok(row.0)
    }

    /// A user's starred stories, most recently starred first.
    pub async fn starred_stories_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<StarredStory>, DatabaseError> {
        let rows = sqlx::query_as::<_, StarredStoryRow>(
            r#"
            SELECT id, user_id, starred_date, story_date, story_title, story_permalink,
                   story_guid, story_content, story_author_name, story_feed_id, story_tags
            FROM starred_stories
            WHERE user_id = ?
            ORDER BY starred_date DESC, id DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StarredStoryRow::into_story).collect()
    }
}
