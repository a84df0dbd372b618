//! Transport for the interaction backend.
//!
//! # Architecture
//!
//! - [`Backend`] - the request/response boundary the engine talks to. One
//!   async method per remote operation, each returning either the typed
//!   payload or a normalized [`ApiFailure`].
//! - [`HttpBackend`] - `reqwest` implementation against the REST endpoints
//!   rooted at [`ClientConfig::base_url`].
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create record | `POST {base}/` with the record as JSON |
//! | conversational update | `POST {base}/ai/conversation` with `{message, current_data}` |
//! | history | `GET {base}/ai/history/{name}` |
//! | summary | `GET {base}/ai/summary/{name}` |
//! | suggestions | `GET {base}/ai/suggestions/{name}` |
//!
//! # Error Handling
//!
//! Nothing is retried. A non-success status with a JSON body is classified by
//! [`ApiFailure::from_body`]; a non-JSON body, a connection failure, or a
//! timeout becomes [`ApiFailure::Transport`]. A success status whose body does
//! not decode into the endpoint's payload becomes
//! [`ApiFailure::MalformedResponse`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

pub use rapport_types;
use rapport_types::{
    ApiFailure, FormSnapshot, HistoryPage, InteractionRecord, StoredInteraction, SuggestionItem,
    Summary,
};

/// Default backend root, as served by a local development server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/interactions";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// The opaque request/response boundary for the five remote operations.
///
/// Implementations never panic on bad input from the far side; every failure
/// comes back as an [`ApiFailure`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_interaction(
        &self,
        record: &InteractionRecord,
    ) -> Result<StoredInteraction, ApiFailure>;

    /// Returns the backend's merged form object, still undecoded.
    async fn conversation(
        &self,
        message: &str,
        current: &FormSnapshot,
    ) -> Result<Value, ApiFailure>;

    async fn history(&self, hcp_name: &str) -> Result<HistoryPage, ApiFailure>;

    async fn summary(&self, hcp_name: &str) -> Result<Summary, ApiFailure>;

    async fn suggestions(&self, hcp_name: &str) -> Result<Vec<SuggestionItem>, ApiFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientBuildError> {
        let base_url = Url::parse(base_url).map_err(|source| ClientBuildError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: source.to_string(),
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientBuildError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        Ok(Self { base_url, timeout })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL)
                .unwrap_or_else(|_| unreachable!("default base URL is a valid literal")),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid backend URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SuggestionsPayload {
    #[serde(default)]
    suggestions: Vec<SuggestionItem>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientBuildError> {
        let client = base_client_builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint URL under the base path. Segments are percent-encoded, so a
    /// name containing `/` or `?` stays a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiFailure> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                ApiFailure::Transport(format!("backend URL cannot be a base: {}", self.base_url))
            })?;
            path.pop_if_empty();
            if segments.is_empty() {
                path.push("");
            } else {
                path.extend(segments);
            }
        }
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ApiFailure> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Backend request failed");
            ApiFailure::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            let failure = classify_error_body(status, &body);
            tracing::debug!(operation, %status, failure = %failure.diagnostic(), "Backend rejected request");
            return Err(failure);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(operation, error = %e, "Unexpected response payload");
            ApiFailure::MalformedResponse(e.to_string())
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_interaction(
        &self,
        record: &InteractionRecord,
    ) -> Result<StoredInteraction, ApiFailure> {
        let url = self.endpoint(&[])?;
        self.send_json(self.client.post(url).json(record), "create_interaction")
            .await
    }

    async fn conversation(
        &self,
        message: &str,
        current: &FormSnapshot,
    ) -> Result<Value, ApiFailure> {
        let url = self.endpoint(&["ai", "conversation"])?;
        let body = json!({
            "message": message,
            "current_data": current,
        });
        self.send_json(self.client.post(url).json(&body), "conversation")
            .await
    }

    async fn history(&self, hcp_name: &str) -> Result<HistoryPage, ApiFailure> {
        let url = self.endpoint(&["ai", "history", hcp_name])?;
        self.send_json(self.client.get(url), "history").await
    }

    async fn summary(&self, hcp_name: &str) -> Result<Summary, ApiFailure> {
        let url = self.endpoint(&["ai", "summary", hcp_name])?;
        self.send_json(self.client.get(url), "summary").await
    }

    async fn suggestions(&self, hcp_name: &str) -> Result<Vec<SuggestionItem>, ApiFailure> {
        let url = self.endpoint(&["ai", "suggestions", hcp_name])?;
        let payload: SuggestionsPayload = self.send_json(self.client.get(url), "suggestions").await?;
        Ok(payload.suggestions)
    }
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Read an error body, keeping at most `MAX_ERROR_BODY_BYTES`.
pub async fn read_capped_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

fn classify_error_body(status: reqwest::StatusCode, body: &str) -> ApiFailure {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ApiFailure::from_body(value),
        Err(_) => ApiFailure::Transport(format!("HTTP {status}: {body}")),
    }
}
