//! Mock backend for testing without a live LLM.
//!
//! [`MockBackend`] returns scripted replies in call order, can fail chosen
//! calls with a given [`InvocationError`], can sleep to simulate a slow
//! provider, and records every request it receives so tests can assert on
//! exactly what each stage was sent.
//!
//! # Example
//!
//! ```
//! use article_crew::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["P-out".into(), "W-out".into(), "E-out".into()]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, InvokeResult, LlmRequest, LlmResponse};
use crate::error::InvocationError;

type Responder = Box<dyn Fn(&LlmRequest) -> InvokeResult<String> + Send + Sync>;

enum Replies {
    Scripted(Vec<String>),
    Computed(Responder),
}

/// A test backend with scripted behavior.
///
/// Scripted replies cycle back to the beginning when exhausted. Call
/// indices are 0-based and count every call, including failed ones.
/// For streaming, the reply is emitted as whitespace-split tokens.
pub struct MockBackend {
    replies: Replies,
    failures: HashMap<usize, InvocationError>,
    delay: Option<Duration>,
    index: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let replies = match &self.replies {
            Replies::Scripted(r) => format!("{} scripted", r.len()),
            Replies::Computed(_) => "computed".to_string(),
        };
        f.debug_struct("MockBackend")
            .field("replies", &replies)
            .field("failures", &self.failures.keys().collect::<Vec<_>>())
            .field("delay", &self.delay)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl MockBackend {
    /// Create a mock backend with the given replies, returned in order.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockBackend requires at least one response");
        Self::with_replies(Replies::Scripted(responses))
    }

    /// Create a mock that always returns the same reply.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock whose reply is computed from each request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> InvokeResult<String> + Send + Sync + 'static,
    {
        Self::with_replies(Replies::Computed(Box::new(responder)))
    }

    fn with_replies(replies: Replies) -> Self {
        Self {
            replies,
            failures: HashMap::new(),
            delay: None,
            index: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the call with this 0-based index.
    pub fn failing_at(mut self, call: usize, error: InvocationError) -> Self {
        self.failures.insert(call, error);
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    async fn next_reply(&self, request: &LlmRequest) -> InvokeResult<String> {
        let call = self.index.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.get(&call) {
            return Err(err.clone());
        }
        match &self.replies {
            Replies::Scripted(responses) => Ok(responses[call % responses.len()].clone()),
            Replies::Computed(responder) => responder(request),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> InvokeResult<LlmResponse> {
        let text = self.next_reply(request).await?;
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    async fn complete_streaming(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> InvokeResult<LlmResponse> {
        let text = self.next_reply(request).await?;
        for token in text.split_inclusive(char::is_whitespace) {
            on_token(token.to_string());
        }
        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
