use super::schema::Database;
use super::types::{DatabaseError, UserFolders};
use crate::feed::FolderTree;

impl Database {
    // ========================================================================
    // Folder Tree Operations
    // ========================================================================

    /// Load the user's folder tree, if one has been stored.
    pub async fn get_folders(&self, user_id: i64) -> Result<Option<UserFolders>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT folders FROM user_subscription_folders WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => Ok(Some(UserFolders {
                user_id,
                folders: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }

    /// Replace the user's folder tree, discarding whatever was stored.
    pub async fn replace_folders(
        &self,
        user_id: i64,
        folders: &FolderTree,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(folders)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_subscription_folders WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO user_subscription_folders (user_id, folders) VALUES (?, ?)")
            .bind(user_id)
            .bind(&json)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Store the folder tree only when the user has none yet.
    ///
    /// Returns `true` if the tree was written, `false` if an existing tree was
    /// left in place.
    pub async fn create_folders_if_absent(
        &self,
        user_id: i64,
        folders: &FolderTree,
    ) -> Result<bool, DatabaseError> {
        let json = serde_json::to_string(folders)?;
        let result = sqlx::query(
            r#"
            INSERT INTO user_subscription_folders (user_id, folders)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO NOTHING
        "#,
        )
        .bind(user_id)
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::FolderTree;
    use crate::storage::{Database, DatabaseError};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn sample_tree() -> FolderTree {
        let mut news = FolderTree::new();
        news.push_feed(3);
        let mut tree = FolderTree::new();
        tree.push_feed(1);
        tree.push_folder("News", news);
        tree
    }

    #[tokio::test]
    async fn test_missing_folders_is_none() {
        let db = test_db().await;
        let user_id = db.create_user("u", false).await.unwrap();
        assert!(db.get_folders(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_folders_overwrites() {
        let db = test_db().await;
        let user_id = db.create_user("u", false).await.unwrap();

        db.replace_folders(user_id, &sample_tree()).await.unwrap();
        let mut other = FolderTree::new();
        other.push_feed(9);
        db.replace_folders(user_id, &other).await.unwrap();

        let stored = db.get_folders(user_id).await.unwrap().unwrap();
        assert_eq!(stored.folders, other);
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_existing() {
        let db = test_db().await;
        let user_id = db.create_user("u", false).await.unwrap();

        assert!(db
            .create_folders_if_absent(user_id, &sample_tree())
            .await
            .unwrap());

        let mut other = FolderTree::new();
        other.push_feed(9);
        assert!(!db.create_folders_if_absent(user_id, &other).await.unwrap());

        let stored = db.get_folders(user_id).await.unwrap().unwrap();
        assert_eq!(stored.folders, sample_tree());
    }

    #[tokio::test]
    async fn test_corrupt_folder_document() {
        let db = test_db().await;
        let user_id = db.create_user("u", false).await.unwrap();
        sqlx::query("INSERT INTO user_subscription_folders (user_id, folders) VALUES (?, ?)")
            .bind(user_id)
            .bind("[1, \"not a node\"]")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.get_folders(user_id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Corrupt(_)));
    }
}
