//! Backend for OpenAI-compatible chat APIs.
//!
//! [`OpenAiBackend`] serves both OpenAI and Groq: Groq exposes the same
//! `/v1/chat/completions` contract under `https://api.groq.com/openai`, so
//! only the base URL and the key differ.
//!
//! Streaming: SSE with `data: {"choices": [{"delta": {"content": "token"}}]}`.

use super::{error_from_response, Backend, InvokeResult, LlmRequest, LlmResponse};
use crate::config::redact;
use crate::error::InvocationError;
use crate::streaming::{Framing, StreamDecoder};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use article_crew::backend::OpenAiBackend;
///
/// let backend = OpenAiBackend::new().with_api_key("gsk_...");
/// assert!(backend.has_api_key());
/// ```
#[derive(Clone, Default)]
pub struct OpenAiBackend {
    /// Sent as `Authorization: Bearer {key}` when set.
    pub(crate) api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a backend without authentication (local OpenAI-compatible servers).
    pub fn new() -> Self {
        Self { api_key: None }
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the messages array: optional system persona, then the user prompt.
    fn build_messages(request: &LlmRequest) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        messages
    }

    /// Build the request body for `/v1/chat/completions`.
    ///
    /// Ollama-specific `options` are not forwarded.
    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "messages": Self::build_messages(request),
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
            "stream": stream,
        })
    }

    fn build_http_request(
        &self,
        client: &Client,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut req = client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }

    /// Pull `choices[0].message.content` out of a completion body.
    fn extract_content(json_resp: &Value) -> InvokeResult<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                let snippet = json_resp.to_string();
                let snippet: String = snippet.chars().take(200).collect();
                InvocationError::MalformedResponse(format!(
                    "no choices[0].message.content in completion: {}",
                    snippet
                ))
            })
    }

    fn delta_content(json_val: &Value) -> Option<&str> {
        json_val
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
    }

    /// Extract metadata from an OpenAI response.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["usage", "model", "id"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }

    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        body: &Value,
    ) -> InvokeResult<(reqwest::Response, String)> {
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        tracing::debug!(%url, model = %body["model"], "openai-compatible request");

        let resp = self
            .build_http_request(client, &url, body)
            .send()
            .await
            .map_err(|e| InvocationError::from_transport(&url, e))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok((resp, url))
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> InvokeResult<LlmResponse> {
        let body = Self::build_body(request, false);
        let (resp, url) = self.send(client, base_url, &body).await?;
        let status = resp.status().as_u16();

        let raw = resp
            .text()
            .await
            .map_err(|e| InvocationError::from_transport(&url, e))?;
        let json_resp: Value = serde_json::from_str(&raw).map_err(|e| {
            InvocationError::MalformedResponse(format!("completion body is not JSON: {}", e))
        })?;

        Ok(LlmResponse {
            text: Self::extract_content(&json_resp)?,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> InvokeResult<LlmResponse> {
        let body = Self::build_body(request, true);
        let (resp, url) = self.send(client, base_url, &body).await?;
        let status = resp.status().as_u16();

        let mut stream = resp.bytes_stream();
        let mut decoder = StreamDecoder::new(Framing::Sse);
        let mut accumulated = String::new();

        let mut take = |json_val: &Value, accumulated: &mut String| {
            if let Some(content) = Self::delta_content(json_val) {
                if !content.is_empty() {
                    accumulated.push_str(content);
                    on_token(content.to_string());
                }
            }
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InvocationError::from_transport(&url, e))?;
            for json_val in decoder.decode(&chunk) {
                take(&json_val, &mut accumulated);
            }
        }

        for json_val in decoder.flush() {
            take(&json_val, &mut accumulated);
        }

        Ok(LlmResponse {
            text: accumulated,
            status,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> LlmRequest {
        LlmRequest::new("gpt-4o-mini", "Write about Renewable Energy")
    }

    #[test]
    fn test_chat_payload_with_persona() {
        let request = test_request().with_system("You are Content Planner.");
        let body = OpenAiBackend::build_body(&request, false);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], false);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are Content Planner.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Write about Renewable Energy");
    }

    #[test]
    fn test_no_system_message_without_persona() {
        let body = OpenAiBackend::build_body(&test_request(), false);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_custom_options_not_forwarded() {
        let mut request = test_request();
        request.config = LlmConfig::default().with_options(json!({"top_p": 0.9}));
        let body = OpenAiBackend::build_body(&request, false);
        assert!(body.get("options").is_none());
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_streaming_body() {
        let body = OpenAiBackend::build_body(&test_request(), true);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_auth_header() {
        let backend = OpenAiBackend::new().with_api_key("sk-test123");
        let req = backend
            .build_http_request(
                &Client::new(),
                "https://api.openai.com/v1/chat/completions",
                &json!({}),
            )
            .build()
            .expect("build request");
        assert_eq!(req.headers().get("Authorization").expect("auth"), "Bearer sk-test123");
    }

    #[test]
    fn test_no_auth_header_without_key() {
        let req = OpenAiBackend::new()
            .build_http_request(&Client::new(), "http://localhost:8080/v1/chat/completions", &json!({}))
            .build()
            .expect("build request");
        assert!(req.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_extract_content() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "# Title"}}],
            "usage": {"total_tokens": 12}
        });
        assert_eq!(OpenAiBackend::extract_content(&body).unwrap(), "# Title");
        let meta = OpenAiBackend::extract_metadata(&body).unwrap();
        assert_eq!(meta["usage"]["total_tokens"], 12);
    }

    #[test]
    fn test_missing_content_is_malformed() {
        let body = json!({"error": {"message": "model overloaded"}});
        assert!(matches!(
            OpenAiBackend::extract_content(&body),
            Err(InvocationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let backend = OpenAiBackend::new().with_api_key("sk-1234567890abcdef");
        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains("1234567890abcdef"));
        assert!(debug_output.contains("sk-123***"));
    }

    async fn server_replying(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_completion_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{"message": {"role": "assistant", "content": "P-out"}}],
                "usage": {"total_tokens": 9}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = OpenAiBackend::new()
            .with_api_key("sk-test")
            .complete(&Client::new(), &server.uri(), &test_request())
            .await
            .unwrap();
        assert_eq!(resp.text, "P-out");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.metadata.unwrap()["usage"]["total_tokens"], 9);
    }

    #[tokio::test]
    async fn test_401_is_authentication_error() {
        let server =
            server_replying(ResponseTemplate::new(401).set_body_string("Invalid API key")).await;
        let result = OpenAiBackend::new()
            .with_api_key("sk-wrong")
            .complete(&Client::new(), &server.uri(), &test_request())
            .await;
        match result {
            Err(InvocationError::Authentication { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_429_carries_retry_after() {
        let server = server_replying(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("rate limited"),
        )
        .await;
        let result = OpenAiBackend::new()
            .complete(&Client::new(), &server.uri(), &test_request())
            .await;
        match result {
            Err(InvocationError::Http {
                status,
                retry_after,
                ..
            }) => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(7)));
            }
            other => panic!("expected http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server =
            server_replying(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
                .await;
        let result = OpenAiBackend::new()
            .complete(&Client::new(), &server.uri(), &test_request())
            .await;
        assert!(matches!(result, Err(InvocationError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_sse_stream_over_http() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"# Renewable\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" Energy\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let server =
            server_replying(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
                .await;

        let mut tokens = Vec::new();
        let resp = OpenAiBackend::new()
            .complete_streaming(&Client::new(), &server.uri(), &test_request(), &mut |t| {
                tokens.push(t)
            })
            .await
            .unwrap();
        assert_eq!(resp.text, "# Renewable Energy");
        assert_eq!(tokens, vec!["# Renewable", " Energy"]);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let result = OpenAiBackend::new()
            .complete(&Client::new(), "http://127.0.0.1:9", &test_request())
            .await;
        assert!(matches!(result, Err(InvocationError::Network { .. })));
    }
}
