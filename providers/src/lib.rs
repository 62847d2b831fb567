//! Remote language-model client.
//!
//! # Architecture
//!
//! - [`RemoteClient`] - posts a chat-completion request built from the user's
//!   question and a page excerpt, and returns the assistant text
//! - [`mistral`] - wire types for the Mistral chat-completions API
//!
//! There is no retry, no streaming and no request timeout: one request, one
//! response, awaited once. Only connection establishment is bounded.
//!
//! # Error Handling
//!
//! Every failure is a [`RemoteError`]. An empty API key short-circuits with
//! [`RemoteError::MissingApiKey`] before any network activity. Callers are
//! expected to turn errors into a spoken apology; nothing here is fatal.

pub mod mistral;

use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use voxpage_types::{ApiKey, ModelChoice, Settings};

pub use mistral::{ChatMessage, ChatRequest, ChatResponse};

/// Canonical Mistral chat-completions endpoint.
pub const MISTRAL_CHAT_COMPLETIONS_URL: &str = "https://api.mistral.ai/v1/chat/completions";

/// System instruction sent with every page question.
pub const SYSTEM_PROMPT: &str = "You are voxpage, an AI screen reader assistant for visually \
impaired users. Provide helpful, concise responses about webpage content.";

/// User message sent by the connection check.
pub const KEY_CHECK_PROMPT: &str = "Say hello briefly";

/// Upper bound on the page excerpt embedded in a prompt, in characters.
pub const MAX_PROMPT_EXCERPT_CHARS: usize = 1000;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder()
            .https_only(true)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build hardened HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Status {
        status: u16,
        body: String,
        /// `error.message` (or top-level `message`) from a JSON error body.
        message: Option<String>,
    },
    #[error("Invalid response format from API: {0}")]
    Parse(String),
}

impl RemoteError {
    /// Human-readable reason, preferring the API's own error message.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            RemoteError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            RemoteError::Status { .. } => "Unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

/// The page half of a remote prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExcerpt {
    pub title: String,
    /// Main-content excerpt; anything past [`MAX_PROMPT_EXCERPT_CHARS`] is dropped.
    pub excerpt: String,
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for RemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteClient {
    /// Client for the canonical endpoint, sharing the hardened HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(http_client().clone(), MISTRAL_CHAT_COMPLETIONS_URL)
    }

    /// Client for a configured endpoint. Non-HTTPS endpoints (local proxies)
    /// get a client without the HTTPS-only restriction.
    #[must_use]
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint.starts_with("https://") {
            return Self::with_client(http_client().clone(), endpoint);
        }
        tracing::warn!(endpoint, "Using non-HTTPS endpoint for remote queries");
        let client = base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build HTTP client: {e}. Using defaults.");
            reqwest::Client::new()
        });
        Self::with_client(client, endpoint)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the remote model about the page.
    pub async fn send(
        &self,
        settings: &Settings,
        question: &str,
        page: &PageExcerpt,
    ) -> Result<String, RemoteError> {
        if settings.api_key.is_missing() {
            tracing::info!("Missing API key; skipping remote query");
            return Err(RemoteError::MissingApiKey);
        }

        let request = ChatRequest::page_question(settings.model, question, page);
        tracing::info!(model = %request.model, "Sending remote query");
        self.complete(&settings.api_key, &request).await
    }

    /// Minimal request against the small model to verify the key works.
    pub async fn key_check(&self, api_key: &ApiKey) -> Result<(), RemoteError> {
        if api_key.is_missing() {
            return Err(RemoteError::MissingApiKey);
        }
        // Only the status matters here; the reply text is discarded.
        self.post(api_key, &ChatRequest::key_check()).await.map(|_| ())
    }

    async fn complete(&self, api_key: &ApiKey, request: &ChatRequest) -> Result<String, RemoteError> {
        let response = self.post(api_key, request).await?;
        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("Unexpected response format: {e}");
            RemoteError::Parse(e.to_string())
        })?;
        parsed
            .into_content()
            .ok_or_else(|| RemoteError::Parse("missing choices[0].message.content".to_string()))
    }

    async fn post(
        &self,
        api_key: &ApiKey,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.as_str())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(%status, "Remote response received");

        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            let message = mistral::error_message(&body);
            tracing::warn!(status = status.as_u16(), "Remote API error");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
                message,
            });
        }
        Ok(response)
    }
}

/// Model used by the connection check.
#[must_use]
pub const fn key_check_model() -> ModelChoice {
    ModelChoice::Small
}
