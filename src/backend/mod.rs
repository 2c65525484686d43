//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. Built-in implementations: [`OllamaBackend`], [`OpenAiBackend`],
//! and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! EndpointAdapter ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!                                          │
//!                               ┌──────────┴──────────┐
//!                          OllamaBackend         OpenAiBackend
//!                         /api/generate          /v1/chat/completions
//!                         /api/chat              (OpenAI, Groq)
//!                         NDJSON streaming       SSE streaming
//! ```

pub mod backoff;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::LlmConfig;
use crate::error::InvocationError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single backend call.
pub type InvokeResult<T> = std::result::Result<T, InvocationError>;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// A normalized LLM request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"llama3"`, `"gpt-4o-mini"`).
    pub model: String,

    /// Persona text sent as the system message. `None` for prompt-only calls.
    pub system_prompt: Option<String>,

    /// The user prompt text.
    pub prompt: String,

    /// Sampling configuration.
    pub config: LlmConfig,

    /// Whether to use the streaming endpoint.
    pub stream: bool,
}

impl LlmRequest {
    /// Prompt-only request with default sampling.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            config: LlmConfig::default(),
            stream: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }
}

/// A normalized LLM response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, timing, model info).
    /// Stored as raw JSON; each provider returns different fields.
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over LLM providers.
///
/// Implementors translate between the normalized [`LlmRequest`]/[`LlmResponse`]
/// and the provider's HTTP API, and classify failures into
/// [`InvocationError`] kinds. The trait is object-safe and designed to be
/// used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming LLM call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> InvokeResult<LlmResponse>;

    /// Execute a streaming LLM call.
    ///
    /// `on_token` is called for each token as it arrives. The final
    /// accumulated text is returned as an [`LlmResponse`].
    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> InvokeResult<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success response into an [`InvocationError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> InvocationError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let text = resp.text().await.unwrap_or_default();
    InvocationError::from_status(status, text, retry_after)
}

/// Check whether an [`InvocationError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`InvocationError::Http`] with a status in `config.retryable_statuses`
/// - [`InvocationError::Network`] (connection/transport errors)
///
/// Authentication failures, timeouts and malformed responses are never retried.
pub fn is_retryable(error: &InvocationError, config: &BackoffConfig) -> bool {
    match error {
        InvocationError::Http { status, .. } => config.retryable_statuses.contains(status),
        InvocationError::Network { .. } => true,
        _ => false,
    }
}

/// Delay before retry `attempt` (1-based) after `last_error`.
fn retry_delay(last_error: &InvocationError, config: &BackoffConfig, attempt: u32) -> Duration {
    match last_error {
        InvocationError::Http {
            retry_after: Some(ra),
            ..
        } if config.respect_retry_after => *ra,
        _ => config.delay_for_attempt(attempt - 1),
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// With [`BackoffConfig::none()`] (the default) this is exactly one call.
/// Returns the first successful response, or the last error if all retries
/// are exhausted.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    mut on_retry: RetryCallback<'_>,
) -> InvokeResult<LlmResponse> {
    let mut attempt = 0;
    loop {
        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < config.max_retries && is_retryable(&e, config) => {
                attempt += 1;
                let delay = retry_delay(&e, config, attempt);
                let reason = e.to_string();
                tracing::warn!(
                    backend = backend.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "transport retry"
                );
                if let Some(ref mut cb) = on_retry {
                    cb(attempt, delay, &reason);
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Options for [`with_backoff_streaming`]: bundles the callback parameters.
pub struct BackoffStreamOpts<'a> {
    /// Optional callback invoked before each retry.
    pub on_retry: RetryCallback<'a>,
    /// Token callback. Receives each token as it arrives.
    pub on_token: &'a mut (dyn FnMut(String) + Send),
}

/// Execute a streaming backend call with transport-level retry.
///
/// Same as [`with_backoff`] but for streaming calls. Each retry restarts
/// the stream from scratch; tokens from a failed attempt have already been
/// delivered to `on_token`.
pub async fn with_backoff_streaming(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    opts: BackoffStreamOpts<'_>,
) -> InvokeResult<LlmResponse> {
    let BackoffStreamOpts {
        mut on_retry,
        on_token,
    } = opts;
    let mut attempt = 0;
    loop {
        match backend
            .complete_streaming(client, base_url, request, on_token)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) if attempt < config.max_retries && is_retryable(&e, config) => {
                attempt += 1;
                let delay = retry_delay(&e, config, attempt);
                let reason = e.to_string();
                tracing::warn!(
                    backend = backend.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "transport retry (streaming)"
                );
                if let Some(ref mut cb) = on_retry {
                    cb(attempt, delay, &reason);
                }
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
