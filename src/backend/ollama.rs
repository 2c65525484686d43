//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] translates normalized [`LlmRequest`]s into Ollama's
//! `/api/generate` and `/api/chat` endpoints. Streaming uses NDJSON with one
//! `{"response": "token"}` (generate) or `{"message": {"content": "token"}}`
//! (chat) object per line.

use super::{error_from_response, Backend, InvokeResult, LlmRequest, LlmResponse};
use crate::error::InvocationError;
use crate::streaming::{Framing, StreamDecoder};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

/// Backend for a local Ollama server. No authentication.
///
/// # Endpoint selection
///
/// Uses `/api/chat` when the request carries a non-empty system prompt
/// (every crew stage does: the persona goes there), `/api/generate`
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct OllamaBackend;

impl OllamaBackend {
    /// Build the Ollama `options` object from the sampling config.
    fn build_options(request: &LlmRequest) -> Value {
        let mut opts = json!({
            "temperature": request.config.temperature,
            "num_predict": request.config.max_tokens,
        });
        if let Some(ref custom) = request.config.options {
            if let (Some(base), Some(extra)) = (opts.as_object_mut(), custom.as_object()) {
                for (k, v) in extra {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        opts
    }

    fn use_chat(request: &LlmRequest) -> bool {
        request
            .system_prompt
            .as_ref()
            .is_some_and(|s| !s.is_empty())
    }

    /// `(url, body)` for the endpoint this request should hit.
    fn build_call(base_url: &str, request: &LlmRequest, stream: bool) -> (String, Value) {
        let base = base_url.trim_end_matches('/');
        if Self::use_chat(request) {
            let messages = json!([
                {"role": "system", "content": request.system_prompt.as_deref().unwrap_or_default()},
                {"role": "user", "content": request.prompt},
            ]);
            (
                format!("{}/api/chat", base),
                json!({
                    "model": request.model,
                    "messages": messages,
                    "stream": stream,
                    "options": Self::build_options(request),
                }),
            )
        } else {
            (
                format!("{}/api/generate", base),
                json!({
                    "model": request.model,
                    "prompt": request.prompt,
                    "stream": stream,
                    "options": Self::build_options(request),
                }),
            )
        }
    }

    /// Text carried by one response object (full reply or streamed token).
    fn content_of(json_val: &Value, chat: bool) -> Option<&str> {
        if chat {
            json_val
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        } else {
            json_val.get("response").and_then(|r| r.as_str())
        }
    }

    /// Ollama reports some failures as `{"error": "..."}` inside the stream.
    fn stream_error(json_val: &Value) -> Option<InvocationError> {
        json_val
            .get("error")
            .and_then(|e| e.as_str())
            .map(|msg| InvocationError::MalformedResponse(format!("ollama error: {}", msg)))
    }

    /// Extract timing and token-count fields from an Ollama response.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in [
            "total_duration",
            "eval_count",
            "eval_duration",
            "prompt_eval_count",
            "model",
        ] {
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

    async fn send(client: &Client, url: &str, body: &Value) -> InvokeResult<reqwest::Response> {
        tracing::debug!(%url, model = %body["model"], "ollama request");
        let resp = client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| InvocationError::from_transport(url, e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> InvokeResult<LlmResponse> {
        let chat = Self::use_chat(request);
        let (url, body) = Self::build_call(base_url, request, false);
        let resp = Self::send(client, &url, &body).await?;
        let status = resp.status().as_u16();

        let raw = resp
            .text()
            .await
            .map_err(|e| InvocationError::from_transport(&url, e))?;
        let json_resp: Value = serde_json::from_str(&raw).map_err(|e| {
            InvocationError::MalformedResponse(format!("ollama body is not JSON: {}", e))
        })?;
        if let Some(err) = Self::stream_error(&json_resp) {
            return Err(err);
        }

        let text = Self::content_of(&json_resp, chat).ok_or_else(|| {
            InvocationError::MalformedResponse(format!(
                "ollama reply has no {} field",
                if chat { "message.content" } else { "response" }
            ))
        })?;

        Ok(LlmResponse {
            text: text.to_string(),
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
        let chat = Self::use_chat(request);
        let (url, body) = Self::build_call(base_url, request, true);
        let resp = Self::send(client, &url, &body).await?;
        let status = resp.status().as_u16();

        let mut stream = resp.bytes_stream();
        let mut decoder = StreamDecoder::new(Framing::Ndjson);
        let mut accumulated = String::new();
        let mut metadata = None;

        let mut take = |json_val: Value, accumulated: &mut String, metadata: &mut Option<Value>| {
            if let Some(err) = Self::stream_error(&json_val) {
                return Err(err);
            }
            if let Some(t) = Self::content_of(&json_val, chat) {
                if !t.is_empty() {
                    accumulated.push_str(t);
                    on_token(t.to_string());
                }
            }
            if json_val.get("done").and_then(|v| v.as_bool()) == Some(true) {
                *metadata = Self::extract_metadata(&json_val);
            }
            Ok(())
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InvocationError::from_transport(&url, e))?;
            for json_val in decoder.decode(&chunk) {
                take(json_val, &mut accumulated, &mut metadata)?;
            }
        }
        for json_val in decoder.flush() {
            take(json_val, &mut accumulated, &mut metadata)?;
        }

        Ok(LlmResponse {
            text: accumulated,
            status,
            metadata,
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
