use std::time::Duration;
use thiserror::Error;

/// Failure of a single model invocation.
///
/// Every variant is surfaced to the caller as-is; nothing in the core retries
/// on its own. Transport backoff is opt-in through
/// [`BackoffConfig`](crate::backend::BackoffConfig).
#[derive(Error, Debug, Clone)]
pub enum InvocationError {
    /// The provider rejected the credential (HTTP 401/403).
    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    /// Connection refused, DNS failure, reset stream, etc.
    #[error("network error talking to {url}: {message}")]
    Network { url: String, message: String },

    /// The invocation did not finish within its time limit.
    #[error("model call timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The provider answered, but not with anything we can read.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other non-success status, with an optional `Retry-After` hint.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },
}

impl InvocationError {
    /// Classify a reqwest transport error.
    pub(crate) fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured limit; zero marks "transport timeout".
            InvocationError::Timeout {
                after: Duration::ZERO,
            }
        } else if err.is_decode() {
            InvocationError::MalformedResponse(err.to_string())
        } else {
            InvocationError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => InvocationError::Authentication { status, body },
            _ => InvocationError::Http {
                status,
                body,
                retry_after,
            },
        }
    }

    /// Short machine-friendly label for logs and UIs.
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::Authentication { .. } => "authentication",
            InvocationError::Network { .. } => "network",
            InvocationError::Timeout { .. } => "timeout",
            InvocationError::MalformedResponse(_) => "malformed_response",
            InvocationError::Http { .. } => "http",
        }
    }
}

/// Errors produced by the crew pipeline and its configuration.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid credential, endpoint, model, topic, or stage list.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A direct adapter call failed outside of a pipeline run.
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// A stage failed; the remaining stages were not run.
    ///
    /// `stage_index` is 0-based; `completed` is how many stages finished
    /// before the failure.
    #[error("Stage {} ('{stage}') failed: {source}", .stage_index + 1)]
    Aborted {
        stage_index: usize,
        stage: String,
        completed: usize,
        #[source]
        source: InvocationError,
    },

    /// Cancellation was observed at a stage boundary.
    #[error("Pipeline was cancelled after {completed} completed stage(s)")]
    Cancelled { completed: usize },

    /// Writing the finished article failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML provider config could not be parsed.
    #[cfg(feature = "yaml")]
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Identifier of the stage that failed, if this error came from a stage.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            PipelineError::Aborted { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            InvocationError::from_status(401, "bad key".into(), None),
            InvocationError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            InvocationError::from_status(403, String::new(), None),
            InvocationError::Authentication { status: 403, .. }
        ));
        assert!(matches!(
            InvocationError::from_status(503, String::new(), None),
            InvocationError::Http { status: 503, .. }
        ));
        assert!(matches!(
            InvocationError::from_status(429, "slow down".into(), Some(Duration::from_secs(2))),
            InvocationError::Http {
                status: 429,
                retry_after: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_aborted_display_is_one_based() {
        let err = PipelineError::Aborted {
            stage_index: 1,
            stage: "writer".into(),
            completed: 1,
            source: InvocationError::Timeout {
                after: Duration::from_millis(250),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Stage 2"), "{msg}");
        assert!(msg.contains("writer"), "{msg}");
        assert!(msg.contains("250ms"), "{msg}");
        assert_eq!(err.failed_stage(), Some("writer"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            InvocationError::MalformedResponse("x".into()).kind(),
            "malformed_response"
        );
        assert_eq!(
            InvocationError::Network {
                url: "http://x".into(),
                message: "refused".into()
            }
            .kind(),
            "network"
        );
    }
}
