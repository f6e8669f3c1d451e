//! OpenAI-compatible chat completions client with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ChatBackend;
use crate::error::{BackendError, Result};
use crate::types::{ApiErrorEnvelope, ChatResponseRaw, CompletionRequest};

/// User agent sent with backend requests.
const USER_AGENT: &str = concat!("draftforge/", env!("CARGO_PKG_VERSION"));

/// Per-call deadline for generation requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry behavior for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// Construction options for [`OpenAiBackend`].
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub api_key: String,
    pub base_url: String,
    /// TLS certificate verification; disable only behind intercepting proxies.
    pub ssl_verify: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl BackendOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            ssl_verify: true,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Set a custom base URL (proxies, compatible servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Production [`ChatBackend`] speaking the OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiBackend {
    /// Build a client. Fails on a malformed API key so credential problems
    /// surface before any stage spends tokens.
    pub fn new(options: &BackendOptions) -> Result<Self> {
        if !options.api_key.starts_with("sk-") {
            return Err(BackendError::Auth(
                "API key must start with 'sk-'".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.ssl_verify)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_key: options.api_key.clone(),
            base_url: options.base_url.trim_end_matches('/').to_string(),
            retry: options.retry,
        })
    }

    async fn request_once(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        if let Some(usage) = &raw.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        raw.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Parse("response contained no choices".to_string()))
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut backoff = self.retry.initial_backoff;

        for attempt in 1..=self.retry.max_attempts {
            match self.request_once(request).await {
                Ok(content) => {
                    debug!(model = %request.model, attempt, "completion succeeded");
                    return Ok(content);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient backend failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }

        // The final attempt always returns above; this satisfies the loop type.
        Err(BackendError::Connection("retry budget exhausted".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Failure classification (the only place raw errors are inspected)
// ---------------------------------------------------------------------------

/// Classify a reqwest transport error into a [`BackendError`] kind.
fn classify_transport(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::Timeout(err.to_string());
    }
    if let Some(cause) = certificate_cause(err) {
        return BackendError::Ssl(cause);
    }
    if err.is_connect() {
        return BackendError::Connection(err.to_string());
    }
    if err.is_decode() {
        return BackendError::Parse(err.to_string());
    }
    BackendError::Connection(err.to_string())
}

/// rustls reports trust failures only through the error chain text, so walk
/// the chain once here rather than letting "certificate" checks leak into
/// retry policy.
fn certificate_cause(err: &reqwest::Error) -> Option<String> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.to_ascii_lowercase().contains("certificate") {
            return Some(text);
        }
        source = cause.source();
    }
    None
}

/// Classify a non-success HTTP response.
fn classify_status(status: u16, body: &str) -> BackendError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok();
    let (message, kind, code) = match &parsed {
        Some(envelope) => (
            envelope.error.message.clone(),
            envelope.error.kind.as_str(),
            envelope.error.code.as_str(),
        ),
        None => (snippet(body, 200), "", ""),
    };

    match status {
        401 | 403 => BackendError::Auth(message),
        429 => BackendError::Quota(message),
        _ if code == "insufficient_quota" || kind == "insufficient_quota" => {
            BackendError::Quota(message)
        }
        _ if code == "invalid_api_key" || kind == "authentication_error" => {
            BackendError::Auth(message)
        }
        _ => BackendError::Api { status, message },
    }
}

fn snippet(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
