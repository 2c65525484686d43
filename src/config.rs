//! Provider and sampling configuration.
//!
//! Everything the adapter needs to reach a model is carried in a
//! [`ProviderConfig`] value and passed to
//! [`EndpointAdapter::from_config`](crate::adapter::EndpointAdapter::from_config).
//! Nothing here writes to the process environment, so concurrent runs
//! against different providers cannot interfere.

use crate::error::Result;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default per-stage timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Sampling configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Custom options merged into the Ollama options object.
    pub options: Option<Value>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            options: None,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// The model providers the crew can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// api.openai.com, bearer key.
    OpenAi,
    /// Groq's OpenAI-compatible endpoint, bearer key.
    Groq,
    /// Local Ollama server, no key.
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Groq,
        ProviderKind::Ollama,
    ];

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Groq => "Groq",
            ProviderKind::Ollama => "Llama (via Ollama)",
        }
    }

    /// Models offered for this provider, first one is the default.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["gpt-4o-mini", "gpt-3.5-turbo", "gpt-4o", "gpt-4-turbo"],
            ProviderKind::Groq => &["llama3-8b-8192", "llama3-70b-8192", "mixtral-8x7b-32768"],
            ProviderKind::Ollama => &["llama3", "llama3:8b", "llama3:70b"],
        }
    }

    pub fn default_model(&self) -> &'static str {
        self.models()[0]
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Environment variable [`ProviderConfig::from_env`] reads the key from.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            "ollama" | "llama" => Ok(ProviderKind::Ollama),
            other => Err(PipelineError::Configuration(format!(
                "unknown provider '{}' (expected openai, groq, or ollama)",
                other
            ))),
        }
    }
}

/// Whether a form with this topic and provider config may start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    MissingTopic,
    MissingApiKey(ProviderKind),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => f.write_str("Generate Article"),
            Readiness::MissingTopic => f.write_str("Please enter a topic"),
            Readiness::MissingApiKey(kind) => write!(f, "Please enter your {} API key", kind),
        }
    }
}

/// Connection settings for one provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Model identifier. Empty means the provider's first catalogue entry;
    /// see [`resolved_model`](Self::resolved_model).
    #[serde(default)]
    pub model: String,

    /// Bearer credential. Required for OpenAI and Groq.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-stage timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("llm", &self.llm)
            .finish()
    }
}

pub(crate) fn redact(key: &str) -> String {
    if key.chars().count() > 6 {
        format!("{}***", key.chars().take(6).collect::<String>())
    } else {
        "***".to_string()
    }
}

impl ProviderConfig {
    /// Config for `kind` with its default model and endpoint, no credential.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            llm: LlmConfig::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_llm_config(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// Read a config for `kind` from environment variables.
    ///
    /// Reads the provider's key variable (`OPENAI_API_KEY` / `GROQ_API_KEY`),
    /// `OLLAMA_URL` for Ollama, and `ARTICLE_CREW_MODEL` to override the
    /// model. The environment is only read, never written.
    pub fn from_env(kind: ProviderKind) -> Result<Self> {
        let mut config = Self::new(kind);
        if let Some(var) = kind.api_key_env() {
            config.api_key = std::env::var(var).ok();
        }
        if kind == ProviderKind::Ollama {
            config.base_url = std::env::var("OLLAMA_URL").ok();
        }
        if let Ok(model) = std::env::var("ARTICLE_CREW_MODEL") {
            config.model = model;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from YAML.
    ///
    /// ```yaml
    /// kind: groq
    /// model: llama3-70b-8192
    /// api_key: gsk_...
    /// timeout_secs: 90
    /// ```
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Model to request: the configured one if set, else the provider default.
    pub fn resolved_model(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            self.kind.default_model()
        } else {
            model
        }
    }

    /// Endpoint to call: the override if set, else the provider default.
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Gate for starting a run, mirroring the generate button's states.
    pub fn readiness(&self, topic: &str) -> Readiness {
        if topic.trim().is_empty() {
            Readiness::MissingTopic
        } else if self.kind.requires_api_key() && !self.has_api_key() {
            Readiness::MissingApiKey(self.kind)
        } else {
            Readiness::Ready
        }
    }

    /// Check that the config can produce a working adapter.
    pub fn validate(&self) -> Result<()> {
        if self.kind.requires_api_key() && !self.has_api_key() {
            let var = self.kind.api_key_env().unwrap_or("api_key");
            return Err(PipelineError::Configuration(format!(
                "{} requires an API key (set {})",
                self.kind, var
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::Configuration(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        let url = self.resolved_base_url();
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            PipelineError::Configuration(format!("invalid base URL '{}': {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::Configuration(format!(
                "base URL '{}' must use http or https",
                url
            )));
        }

        let model = self.resolved_model();
        if !self.kind.models().contains(&model) {
            tracing::warn!(
                provider = %self.kind,
                model = %model,
                "model is not in the provider catalogue; passing it through"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_provider() {
        let openai = ProviderConfig::new(ProviderKind::OpenAi);
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(openai.resolved_base_url(), "https://api.openai.com/v1");

        let groq = ProviderConfig::new(ProviderKind::Groq);
        assert_eq!(groq.model, "llama3-8b-8192");
        assert_eq!(groq.resolved_base_url(), "https://api.groq.com/openai/v1");

        let ollama = ProviderConfig::new(ProviderKind::Ollama);
        assert_eq!(ollama.model, "llama3");
        assert_eq!(ollama.resolved_base_url(), "http://localhost:11434");
        assert_eq!(ollama.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = ProviderConfig::new(ProviderKind::OpenAi).validate().unwrap_err();
        match err {
            PipelineError::Configuration(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            other => panic!("expected Configuration, got {:?}", other),
        }

        let blank = ProviderConfig::new(ProviderKind::Groq).with_api_key("   ");
        assert!(matches!(blank.validate(), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(ProviderConfig::new(ProviderKind::Ollama).validate().is_ok());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let cfg = ProviderConfig::new(ProviderKind::Ollama).with_base_url("localhost 11434");
        assert!(matches!(cfg.validate(), Err(PipelineError::Configuration(_))));

        let cfg = ProviderConfig::new(ProviderKind::Ollama).with_base_url("ftp://host");
        assert!(matches!(cfg.validate(), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_empty_model_falls_back_to_default() {
        let cfg = ProviderConfig::new(ProviderKind::Ollama).with_model("  ");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.resolved_model(), "llama3");
    }

    #[test]
    fn test_deserialize_without_model_uses_default() {
        let cfg: ProviderConfig = serde_json::from_str(r#"{"kind":"ollama"}"#).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.resolved_model(), "llama3");

        let adapter = crate::adapter::EndpointAdapter::from_config(&cfg).unwrap();
        assert_eq!(adapter.model(), "llama3");
    }

    #[test]
    fn test_uncatalogued_model_passes() {
        let cfg = ProviderConfig::new(ProviderKind::Ollama).with_model("mistral");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_readiness_messages() {
        let openai = ProviderConfig::new(ProviderKind::OpenAi);
        assert_eq!(openai.readiness("").to_string(), "Please enter a topic");
        assert_eq!(
            openai.readiness("AI in Healthcare").to_string(),
            "Please enter your OpenAI API key"
        );
        let groq = ProviderConfig::new(ProviderKind::Groq);
        assert_eq!(
            groq.readiness("x"),
            Readiness::MissingApiKey(ProviderKind::Groq)
        );
        let ready = openai.with_api_key("sk-test");
        assert!(ready.readiness("AI").is_ready());
        assert_eq!(ready.readiness("AI").to_string(), "Generate Article");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("llama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let cfg = ProviderConfig::new(ProviderKind::OpenAi).with_api_key("sk-abcdef123456");
        let dbg = format!("{:?}", cfg);
        assert!(dbg.contains("sk-abc***"));
        assert!(!dbg.contains("123456"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cfg: ProviderConfig =
            serde_json::from_str(r#"{"kind": "ollama", "model": "llama3:8b"}"#).unwrap();
        assert_eq!(cfg.kind, ProviderKind::Ollama);
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.llm.max_tokens, 2048);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_fills_default_model() {
        let cfg = ProviderConfig::from_yaml_str("kind: groq\napi_key: gsk_test\n").unwrap();
        assert_eq!(cfg.resolved_model(), "llama3-8b-8192");
    }
}
