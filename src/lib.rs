//! # Article Crew
//!
//! A three-stage LLM crew that plans, writes and edits a markdown article
//! on a topic, against OpenAI, Groq or a local Ollama server.
//!
//! Stages run strictly in order. Each stage is a [`Task`] bound to a
//! [`Role`]; the role supplies the persona, the task the instructions, and
//! every earlier stage's output is handed forward as context. The first
//! failing stage aborts the run with an error that names it.
//!
//! ## Core Concepts
//!
//! - **[`EndpointAdapter`]**: one call to the configured model:
//!   `invoke(persona, instructions, context) -> text`, with classified
//!   failures ([`InvocationError`]) and a per-call timeout.
//! - **[`Role`]** / **[`Task`]**: immutable stage definitions.
//! - **[`Pipeline`]**: sequential runner with context hand-off,
//!   cancellation at stage boundaries, and progress [`events`].
//! - **[`crew`]**: the Planner, Writer and Editor stages.
//! - **[`Article`]**: the final markdown with its download name.
//!
//! ## Quick Start
//!
//! ```no_run
//! use article_crew::{crew, Article, EndpointAdapter, ProviderConfig, ProviderKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::from_env(ProviderKind::Groq)?;
//!     let adapter = EndpointAdapter::from_config(&config)?;
//!
//!     let topic = "Renewable Energy";
//!     let result = crew::article_crew(topic)?.execute(&adapter).await?;
//!     let article = Article::from_result(topic, &result);
//!     article.save(".").await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod article;
pub mod backend;
pub mod config;
pub mod crew;
pub mod error;
pub mod events;
pub mod parsing;
pub mod pipeline;
pub mod prompt;
pub mod role;
pub mod streaming;
pub mod task;
pub mod types;

pub use adapter::{EndpointAdapter, EndpointAdapterBuilder, InvokeHooks};
pub use article::Article;
pub use backend::{BackoffConfig, MockBackend, OllamaBackend, OpenAiBackend};
pub use config::{LlmConfig, ProviderConfig, ProviderKind, Readiness};
pub use error::{InvocationError, PipelineError, Result};
pub use events::{ChannelEventHandler, Event, EventHandler, FnEventHandler};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineRun};
pub use prompt::StageInput;
pub use role::Role;
pub use task::Task;
pub use types::{ContextEntry, PipelineContext, PipelineProgress, PipelineResult, RunState};
