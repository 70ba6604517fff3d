use super::schema::Database;
use super::types::{DatabaseError, UploadedOpml, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user, returning its ID.
    pub async fn create_user(&self, username: &str, is_premium: bool) -> Result<i64, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("INSERT INTO users (username, is_premium) VALUES (?, ?) RETURNING id")
                .bind(username)
                .bind(is_premium)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DatabaseError::from_insert(e, username))?;
        Ok(row.0)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, is_premium FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, is_premium FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // ========================================================================
    // Uploaded OPML Archive
    // ========================================================================

    /// Archive a raw OPML upload, returning its ID.
    pub async fn save_uploaded_opml(
        &self,
        user_id: i64,
        opml_file: &str,
    ) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO uploaded_opml (user_id, opml_file, upload_date) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(opml_file)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Archived uploads for a user, newest first.
    pub async fn uploaded_opml_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<UploadedOpml>, DatabaseError> {
        let uploads = sqlx::query_as::<_, UploadedOpml>(
            r#"
            SELECT id, user_id, opml_file, upload_date
            FROM uploaded_opml
            WHERE user_id = ?
            ORDER BY upload_date DESC, id DESC
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let id = db.create_user("alice", true).await.unwrap();

        let user = db.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.is_premium);

        let by_name = db.get_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let db = test_db().await;
        db.create_user("bob", false).await.unwrap();
        let err = db.create_user("bob", false).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_uploaded_opml_newest_first() {
        let db = test_db().await;
        let id = db.create_user("dave", false).await.unwrap();

        let first = db.save_uploaded_opml(id, "<opml>1</opml>").await.unwrap();
        let second = db.save_uploaded_opml(id, "<opml>2</opml>").await.unwrap();

        let uploads = db.uploaded_opml_for_user(id).await.unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].id, second);
        assert_eq!(uploads[1].id, first);
        assert_eq!(uploads[1].opml_file, "<opml>1</opml>");
    }
}
