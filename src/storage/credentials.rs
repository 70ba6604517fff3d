use secrecy::{ExposeSecret, SecretString};

use super::schema::Database;
use super::types::{DatabaseError, OAuthCredential};

impl Database {
    // ========================================================================
    // Reader Credential Operations
    // ========================================================================

    /// Store (or replace) the user's reader-service credential.
    pub async fn store_credential(
        &self,
        user_id: i64,
        credential: &OAuthCredential,
    ) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO oauth_tokens (user_id, access_token, token_secret, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                token_secret = excluded.token_secret,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
        "#,
        )
        .bind(user_id)
        .bind(credential.access_token.expose_secret())
        .bind(credential.token_secret.expose_secret())
        .bind(credential.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_credential(&self, user_id: i64) -> Result<Option<OAuthCredential>, DatabaseError> {
        let row: Option<(String, String, Option<i64>)> = sqlx::query_as(
            "SELECT access_token, token_secret, expires_at FROM oauth_tokens WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(access_token, token_secret, expires_at)| OAuthCredential {
            access_token: SecretString::from(access_token),
            token_secret: SecretString::from(token_secret),
            expires_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, OAuthCredential};
    use secrecy::{ExposeSecret, SecretString};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn credential(token: &str, expires_at: Option<i64>) -> OAuthCredential {
        OAuthCredential {
            access_token: SecretString::from(token.to_string()),
            token_secret: SecretString::from("shh".to_string()),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_store_and_replace_credential() {
        let db = test_db().await;
        let user_id = db.create_user("c", false).await.unwrap();

        db.store_credential(user_id, &credential("first", None))
            .await
            .unwrap();
        db.store_credential(user_id, &credential("second", Some(42)))
            .await
            .unwrap();

        let stored = db.get_credential(user_id).await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "second");
        assert_eq!(stored.expires_at, Some(42));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let db = test_db().await;
        let user_id = db.create_user("c", false).await.unwrap();
        assert!(db.get_credential(user_id).await.unwrap().is_none());
    }

    #[test]
    fn test_expiry() {
        assert!(!credential("t", None).is_expired(1_000));
        assert!(!credential("t", Some(2_000)).is_expired(1_000));
        assert!(credential("t", Some(1_000)).is_expired(1_000));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let debug_output = format!("{:?}", credential("super-secret-token", None));
        assert!(!debug_output.contains("super-secret-token"));
        assert!(!debug_output.contains("shh"));
    }
}
