//! HTTP transport for the drafts API.
//!
//! The transport normalizes every server response into a typed result and
//! enforces a bounded per-request timeout. It never retries; retry policy
//! belongs to the controller's save cadence.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use crate::config::AutosaveConfig;
use crate::model::{Draft, DraftPayload};

/// Errors surfaced by the draft transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response, carrying the parsed JSON body when present.
    /// A 409 body may carry the server's current draft under `draft`.
    #[error("draft API returned status {status}")]
    Status { status: u16, body: Option<Value> },
    /// The client-side timeout elapsed before a response arrived.
    #[error("draft request timed out")]
    Timeout,
    /// Connection-level failure before any status was received.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered 2xx but the body did not decode as a draft.
    #[error("failed to decode draft response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status equivalent for classification. A timeout is reported
    /// as 408 rather than hanging or surfacing a transport error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Timeout => Some(408),
            ApiError::Network(_) | ApiError::Decode(_) => None,
        }
    }

    /// Extracts the server's current draft from a 409 conflict body.
    pub fn conflict_draft(&self) -> Option<Draft> {
        match self {
            ApiError::Status { status: 409, body: Some(body) } => body
                .get("draft")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok()),
            _ => None,
        }
    }
}

/// Remote draft operations used by the controller.
///
/// Implemented by [`HttpTransport`] for production and by in-memory fakes
/// in tests.
#[async_trait]
pub trait DraftApi: Send + Sync {
    /// Creates a new draft via `POST {base}/posts/drafts`.
    async fn create(&self, payload: &DraftPayload) -> Result<Draft, ApiError>;

    /// Updates a draft via `PUT {base}/posts/drafts/{id}`, with the
    /// optimistic concurrency token in `If-Unmodified-Since` when known.
    async fn update(
        &self,
        id: &str,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> Result<Draft, ApiError>;

    /// Fetches a draft via `GET {base}/posts/drafts/{id}`, for hydration
    /// and conflict refetch.
    async fn fetch(&self, id: &str) -> Result<Draft, ApiError>;

    /// Deletes a draft via `DELETE {base}/posts/drafts/{id}`.
    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

/// reqwest-backed implementation of [`DraftApi`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport from config, with the configured request
    /// timeout and a cookie store so session credentials are included.
    pub fn new(config: &AutosaveConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.server_url.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&DraftPayload>,
        if_unmodified_since: Option<&str>,
    ) -> Result<Option<Value>, ApiError> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("Content-Type", "application/json");

        if let Some(token) = if_unmodified_since {
            request = request.header("If-Unmodified-Since", token);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(classify_reqwest)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest)?;

        let data = if text.is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&text).ok()
        };

        if !(200..300).contains(&status) {
            return Err(ApiError::Status { status, body: data });
        }

        Ok(data)
    }

    fn decode_draft(data: Option<Value>) -> Result<Draft, ApiError> {
        let value = data.ok_or_else(|| ApiError::Decode("empty response body".to_string()))?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn classify_reqwest(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(error.to_string())
    }
}

#[async_trait]
impl DraftApi for HttpTransport {
    async fn create(&self, payload: &DraftPayload) -> Result<Draft, ApiError> {
        let data = self
            .execute(Method::POST, "/posts/drafts", Some(payload), None)
            .await?;
        Self::decode_draft(data)
    }

    async fn update(
        &self,
        id: &str,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> Result<Draft, ApiError> {
        let path = format!("/posts/drafts/{}", id);
        let data = self
            .execute(Method::PUT, &path, Some(payload), if_unmodified_since)
            .await?;
        Self::decode_draft(data)
    }

    async fn fetch(&self, id: &str) -> Result<Draft, ApiError> {
        let path = format!("/posts/drafts/{}", id);
        let data = self.execute(Method::GET, &path, None, None).await?;
        Self::decode_draft(data)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/posts/drafts/{}", id);
        self.execute(Method::DELETE, &path, None, None).await?;
        Ok(())
    }
}
