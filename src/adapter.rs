//! Model endpoint adapter.
//!
//! [`EndpointAdapter`] turns one stage's persona, instructions and
//! accumulated context into a single completion from the configured
//! provider. It owns the HTTP client, the [`Backend`], the model id, sampling
//! settings and the per-call timeout, and is built once and shared (by
//! reference or `Arc`) across every stage of every run.

use crate::backend::{
    with_backoff, with_backoff_streaming, Backend, BackoffConfig, BackoffStreamOpts, LlmRequest,
    OllamaBackend, OpenAiBackend, RetryCallback,
};
use crate::config::{LlmConfig, ProviderConfig, ProviderKind, DEFAULT_TIMEOUT_SECS};
use crate::error::{InvocationError, PipelineError, Result};
use crate::prompt::StageInput;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Callbacks observed during one [`EndpointAdapter::invoke_with`] call.
#[derive(Default)]
pub struct InvokeHooks<'a> {
    /// Receives each token when the adapter streams.
    pub on_token: Option<&'a mut (dyn FnMut(String) + Send)>,
    /// Called before each transport retry.
    pub on_retry: RetryCallback<'a>,
}

/// Adapter from a stage's prompt parts to a model completion.
///
/// # Example
///
/// ```
/// use article_crew::{EndpointAdapter, backend::MockBackend};
/// use std::sync::Arc;
///
/// let adapter = EndpointAdapter::builder("http://localhost:11434")
///     .backend(Arc::new(MockBackend::fixed("done")))
///     .model("llama3")
///     .build()
///     .unwrap();
/// assert_eq!(adapter.model(), "llama3");
/// ```
pub struct EndpointAdapter {
    client: Client,
    base_url: String,
    backend: Arc<dyn Backend>,
    model: String,
    llm: LlmConfig,
    backoff: BackoffConfig,
    timeout: Duration,
    streaming: bool,
}

impl std::fmt::Debug for EndpointAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointAdapter")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .field("streaming", &self.streaming)
            .finish()
    }
}

impl EndpointAdapter {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> EndpointAdapterBuilder {
        EndpointAdapterBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            model: None,
            llm: LlmConfig::default(),
            backoff: None,
            timeout: None,
            streaming: false,
        }
    }

    /// Validate `config` and build an adapter for its provider.
    ///
    /// OpenAI and Groq share the OpenAI-compatible backend; Ollama uses its
    /// native API.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let builder = Self::builder(config.resolved_base_url())
            .model(config.resolved_model())
            .llm_config(config.llm.clone())
            .timeout(config.timeout());
        let builder = match config.kind {
            ProviderKind::OpenAi | ProviderKind::Groq => {
                builder.openai_with_key(config.api_key.clone().unwrap_or_default())
            }
            ProviderKind::Ollama => builder.backend(Arc::new(OllamaBackend)),
        };
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Request one completion from raw prompt parts.
    ///
    /// `context` is the concatenation of earlier stage outputs and may be
    /// empty.
    pub async fn invoke(
        &self,
        persona: &str,
        instructions: &str,
        context: &str,
    ) -> std::result::Result<String, InvocationError> {
        let input = StageInput {
            stage: "direct".to_string(),
            persona: persona.to_string(),
            instructions: instructions.to_string(),
            context: context.to_string(),
        };
        self.invoke_with(&input, InvokeHooks::default()).await
    }

    /// Request one completion for a stage, reporting tokens and retries.
    ///
    /// The whole call, retries included, is bounded by the adapter timeout.
    /// A reply that is empty or only whitespace is a malformed response.
    pub async fn invoke_with(
        &self,
        input: &StageInput,
        hooks: InvokeHooks<'_>,
    ) -> std::result::Result<String, InvocationError> {
        let mut request = LlmRequest::new(self.model.clone(), input.user_prompt())
            .with_system(input.system_prompt());
        request.config = self.llm.clone();
        request.stream = self.streaming;

        tracing::debug!(
            stage = %input.stage,
            backend = self.backend.name(),
            model = %self.model,
            streaming = self.streaming,
            context_chars = input.context.len(),
            "invoking model"
        );

        let InvokeHooks { on_token, on_retry } = hooks;
        let call = async {
            if self.streaming {
                let mut discard = |_: String| {};
                let on_token: &mut (dyn FnMut(String) + Send) = match on_token {
                    Some(cb) => cb,
                    None => &mut discard,
                };
                with_backoff_streaming(
                    &self.backend,
                    &self.client,
                    &self.base_url,
                    &request,
                    &self.backoff,
                    BackoffStreamOpts {
                        on_retry: on_retry
                            .map(|cb| cb as &mut (dyn FnMut(u32, Duration, &str) + Send)),
                        on_token,
                    },
                )
                .await
            } else {
                with_backoff(
                    &self.backend,
                    &self.client,
                    &self.base_url,
                    &request,
                    &self.backoff,
                    on_retry,
                )
                .await
            }
        };

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(InvocationError::Timeout { .. })) | Err(_) => {
                tracing::warn!(stage = %input.stage, timeout_ms = self.timeout.as_millis() as u64, "model call timed out");
                return Err(InvocationError::Timeout {
                    after: self.timeout,
                });
            }
            Ok(Err(e)) => {
                tracing::warn!(stage = %input.stage, kind = e.kind(), error = %e, "model call failed");
                return Err(e);
            }
        };

        if response.text.trim().is_empty() {
            return Err(InvocationError::MalformedResponse(
                "model returned an empty completion".to_string(),
            ));
        }

        tracing::debug!(
            stage = %input.stage,
            status = response.status,
            chars = response.text.len(),
            "model call finished"
        );
        Ok(response.text)
    }
}

/// Builder for [`EndpointAdapter`].
pub struct EndpointAdapterBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    model: Option<String>,
    llm: LlmConfig,
    backoff: Option<BackoffConfig>,
    timeout: Option<Duration>,
    streaming: bool,
}

impl EndpointAdapterBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the LLM backend. Default: [`OllamaBackend`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use the OpenAI-compatible backend with `Authorization: Bearer {key}`.
    pub fn openai_with_key(mut self, api_key: impl Into<String>) -> Self {
        self.backend = Some(Arc::new(OpenAiBackend::new().with_api_key(api_key)));
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn llm_config(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// Set the transport retry configuration. Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Bound on each call, retries included. Default: 120 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use the provider's streaming endpoint.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Build the adapter.
    pub fn build(self) -> Result<EndpointAdapter> {
        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        if timeout.is_zero() {
            return Err(PipelineError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let base_url = normalize_base_url(&self.base_url);
        if base_url.is_empty() {
            return Err(PipelineError::Configuration(
                "base URL must not be empty".to_string(),
            ));
        }

        let model = self.model.unwrap_or_default();
        if model.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "model identifier must not be empty".to_string(),
            ));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .connect_timeout(timeout)
                .build()
                .map_err(|e| {
                    PipelineError::Configuration(format!("failed to build HTTP client: {}", e))
                })?,
        };

        Ok(EndpointAdapter {
            client,
            base_url,
            backend: self.backend.unwrap_or_else(|| Arc::new(OllamaBackend)),
            model,
            llm: self.llm,
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            timeout,
            streaming: self.streaming,
        })
    }
}

/// Strip known provider path suffixes from a base URL, since backends
/// append their own paths.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
/// e.g., "http://localhost:11434/api" -> "http://localhost:11434"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    // longest first
    for suffix in &[
        "/v1/chat/completions",
        "/v1/chat",
        "/v1",
        "/api/generate",
        "/api/chat",
        "/api",
    ] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    fn adapter(mock: Arc<MockBackend>) -> EndpointAdapter {
        EndpointAdapter::builder("http://unused")
            .backend(mock)
            .model("test-model")
            .build()
            .unwrap()
    }

    #[test]
    fn test_normalize_base_url_strips_v1() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1"), "https://api.openai.com");
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(
            normalize_base_url("https://api.groq.com/openai/v1"),
            "https://api.groq.com/openai"
        );
    }

    #[test]
    fn test_normalize_base_url_strips_api() {
        assert_eq!(normalize_base_url("http://localhost:11434/api"), "http://localhost:11434");
        assert_eq!(normalize_base_url("http://localhost:11434/api/chat"), "http://localhost:11434");
    }

    #[test]
    fn test_normalize_base_url_strips_full_path() {
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com"
        );
        assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
    }

    #[test]
    fn test_builder_rejects_empty_model() {
        let result = EndpointAdapter::builder("http://localhost:11434").build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = EndpointAdapter::builder("http://localhost:11434")
            .model("llama3")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_default_timeout_is_two_minutes() {
        let adapter = EndpointAdapter::builder("http://localhost:11434")
            .model("llama3")
            .build()
            .unwrap();
        assert_eq!(adapter.timeout(), Duration::from_secs(120));
        assert_eq!(adapter.backend_name(), "ollama");
    }

    #[test]
    fn test_from_config_selects_backend() {
        let groq = ProviderConfig::new(ProviderKind::Groq).with_api_key("gsk_abcdefgh");
        let adapter = EndpointAdapter::from_config(&groq).unwrap();
        assert_eq!(adapter.backend_name(), "openai");
        assert_eq!(adapter.base_url(), "https://api.groq.com/openai");
        assert_eq!(adapter.model(), "llama3-8b-8192");

        let ollama = ProviderConfig::new(ProviderKind::Ollama);
        let adapter = EndpointAdapter::from_config(&ollama).unwrap();
        assert_eq!(adapter.backend_name(), "ollama");
        assert_eq!(adapter.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_from_config_missing_key_is_configuration_error() {
        let result = EndpointAdapter::from_config(&ProviderConfig::new(ProviderKind::OpenAi));
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_invoke_sends_persona_as_system_and_context_in_prompt() {
        let mock = Arc::new(MockBackend::fixed("W-out"));
        let text = adapter(mock.clone())
            .invoke("You are Content Writer.", "Write the article.", "P-out")
            .await
            .unwrap();
        assert_eq!(text, "W-out");

        let seen = mock.requests();
        assert_eq!(seen[0].model, "test-model");
        assert_eq!(seen[0].system_prompt.as_deref(), Some("You are Content Writer."));
        assert!(seen[0].prompt.starts_with("Write the article."));
        assert!(seen[0].prompt.ends_with("P-out"));
    }

    #[tokio::test]
    async fn test_invoke_without_context_sends_instructions_only() {
        let mock = Arc::new(MockBackend::fixed("P-out"));
        adapter(mock.clone())
            .invoke("persona", "Plan it.", "")
            .await
            .unwrap();
        assert_eq!(mock.requests()[0].prompt, "Plan it.");
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed() {
        let mock = Arc::new(MockBackend::fixed("  \n "));
        let result = adapter(mock).invoke("p", "i", "").await;
        assert!(matches!(result, Err(InvocationError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through() {
        let auth = InvocationError::Authentication {
            status: 401,
            body: "bad key".into(),
        };
        let mock = Arc::new(MockBackend::fixed("unused").failing_at(0, auth));
        let result = adapter(mock).invoke("p", "i", "").await;
        assert!(matches!(result, Err(InvocationError::Authentication { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let mock = Arc::new(MockBackend::fixed("late").with_delay(Duration::from_millis(200)));
        let adapter = EndpointAdapter::builder("http://unused")
            .backend(mock)
            .model("m")
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let result = adapter.invoke("p", "i", "").await;
        match result {
            Err(InvocationError::Timeout { after }) => assert_eq!(after, Duration::from_millis(20)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streaming_forwards_tokens() {
        let mock = Arc::new(MockBackend::fixed("an edited article"));
        let adapter = EndpointAdapter::builder("http://unused")
            .backend(mock)
            .model("m")
            .streaming(true)
            .build()
            .unwrap();
        let mut tokens = Vec::new();
        let mut on_token = |t: String| tokens.push(t);
        let input = StageInput {
            stage: "editor".into(),
            persona: "p".into(),
            instructions: "i".into(),
            context: String::new(),
        };
        let text = adapter
            .invoke_with(
                &input,
                InvokeHooks {
                    on_token: Some(&mut on_token),
                    on_retry: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(text, "an edited article");
        assert_eq!(tokens.concat(), text);
        assert_eq!(tokens.len(), 3);
    }

    #[tokio::test]
    async fn test_streaming_without_token_hook() {
        let mock = Arc::new(MockBackend::fixed("a planned outline"));
        let adapter = EndpointAdapter::builder("http://unused")
            .backend(mock.clone())
            .model("m")
            .streaming(true)
            .build()
            .unwrap();
        let text = adapter.invoke("persona", "Plan it.", "").await.unwrap();
        assert_eq!(text, "a planned outline");
        assert!(mock.requests()[0].stream);
    }
}
