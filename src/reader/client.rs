use futures::StreamExt;
use reqwest::redirect::Policy;
use secrecy::ExposeSecret;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{Database, DatabaseError};

/// Largest response body accepted from the reader service.
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Authorized access to the reader service API on behalf of stored users.
///
/// The client looks up the user's credential itself; callers only name the
/// user and the API path.
#[derive(Clone)]
pub struct ReaderClient {
    db: Database,
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for ReaderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReaderClient {
    /// Build a client for `base_url` (e.g. `https://www.google.com/reader/api`).
    ///
    /// # Errors
    ///
    /// [`ReaderError::InsecureBaseUrl`] unless the URL is HTTPS or points at
    /// localhost, since every request carries the user's token.
    pub fn new(db: Database, base_url: &str, timeout: Duration) -> Result<Self, ReaderError> {
        if !base_url.starts_with("https://") {
            let is_localhost = base_url.starts_with("http://127.0.0.1")
                || base_url.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS reader base URL");
                return Err(ReaderError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS reader base URL (localhost only)");
        }

        let http = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            db,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` (relative to the base URL) as `user_id`.
    ///
    /// Returns `None` when the user has no usable credential or the request
    /// fails for any reason; failures are logged, not returned.
    pub async fn authorized_get(&self, user_id: i64, path: &str) -> Option<String> {
        match self.try_authorized_get(user_id, path).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(user_id, path = %path, error = %e, "Reader request failed");
                None
            }
        }
    }

    /// Like [`authorized_get`](Self::authorized_get) but reports why a request
    /// failed. `Ok(None)` means there was no credential to use.
    pub async fn try_authorized_get(
        &self,
        user_id: i64,
        path: &str,
    ) -> Result<Option<String>, ReaderError> {
        let credential = match self.db.get_credential(user_id).await? {
            Some(credential) => credential,
            None => {
                tracing::debug!(user_id, "No reader credential stored");
                return Ok(None);
            }
        };
        if credential.is_expired(chrono::Utc::now().timestamp()) {
            tracing::info!(user_id, "Reader credential has expired");
            return Ok(None);
        }

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(user_id, url = %url, "Requesting reader API");

        let request = self.http.get(&url).header(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", credential.access_token.expose_secret()),
        );

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ReaderError::Timeout(self.timeout))?
            .map_err(ReaderError::Network)?;

        if !response.status().is_success() {
            return Err(ReaderError::HttpStatus(response.status().as_u16()));
        }

        let body = tokio::time::timeout(
            self.timeout,
            read_limited_text(response, MAX_RESPONSE_SIZE),
        )
        .await
        .map_err(|_| ReaderError::Timeout(self.timeout))??;
        Ok(Some(body))
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ReaderError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ReaderError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ReaderError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ReaderError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ReaderError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OAuthCredential;
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(expires_at: Option<i64>) -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("reader", false).await.unwrap();
        db.store_credential(
            user_id,
            &OAuthCredential {
                access_token: SecretString::from("token-123".to_string()),
                token_secret: SecretString::from("secret".to_string()),
                expires_at,
            },
        )
        .await
        .unwrap();
        (db, user_id)
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reader/api/0/subscription/list"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<object/>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (db, user_id) = setup(None).await;
        let base = format!("{}/reader/api/", mock_server.uri());
        let client = ReaderClient::new(db, &base, Duration::from_secs(5)).unwrap();

        let body = client.authorized_get(user_id, "0/subscription/list").await;
        assert_eq!(body.as_deref(), Some("<object/>"));
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("nobody", false).await.unwrap();
        let client = ReaderClient::new(db, &mock_server.uri(), Duration::from_secs(5)).unwrap();

        assert!(client.authorized_get(user_id, "0/subscription/list").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_credential_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (db, user_id) = setup(Some(1)).await;
        let client = ReaderClient::new(db, &mock_server.uri(), Duration::from_secs(5)).unwrap();

        assert!(client.authorized_get(user_id, "0/subscription/list").await.is_none());
    }

    #[tokio::test]
    async fn test_http_error_is_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let (db, user_id) = setup(None).await;
        let client = ReaderClient::new(db, &mock_server.uri(), Duration::from_secs(5)).unwrap();

        let err = client
            .try_authorized_get(user_id, "0/subscription/list")
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::HttpStatus(401)));
        assert!(client.authorized_get(user_id, "0/subscription/list").await.is_none());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let (db, user_id) = setup(None).await;
        let client =
            ReaderClient::new(db, &mock_server.uri(), Duration::from_millis(200)).unwrap();

        let err = client.try_authorized_get(user_id, "x").await.unwrap_err();
        assert!(matches!(
            err,
            ReaderError::Timeout(_) | ReaderError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_http_base_url_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        let result = ReaderClient::new(db, "http://evil.com/reader/api", Duration::from_secs(1));
        assert!(matches!(result, Err(ReaderError::InsecureBaseUrl)));
    }

    #[tokio::test]
    async fn test_debug_omits_database_and_token() {
        let (db, _) = setup(None).await;
        let client =
            ReaderClient::new(db, "https://reader.example.com/api/", Duration::from_secs(1)).unwrap();
        let debug_output = format!("{:?}", client);
        assert!(debug_output.contains("https://reader.example.com/api"));
        assert!(!debug_output.contains("token-123"));
    }
}
