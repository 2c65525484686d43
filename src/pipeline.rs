use crate::{
    adapter::{EndpointAdapter, InvokeHooks},
    error::{InvocationError, PipelineError, Result},
    events::{emit, Event, EventHandler},
    parsing,
    prompt,
    task::Task,
    types::{PipelineContext, PipelineProgress, PipelineResult, RunState},
};
use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

/// Sequential executor for an ordered list of stages.
///
/// Each stage sees its task's instructions plus the outputs of every
/// earlier stage, in order. The first failure aborts the run; nothing is
/// retried or skipped. A `Pipeline` holds no per-run state, so one value
/// (and one [`EndpointAdapter`]) can serve any number of concurrent runs.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> article_crew::Result<()> {
/// use article_crew::{crew, EndpointAdapter};
///
/// let adapter = EndpointAdapter::builder("http://localhost:11434")
///     .model("llama3")
///     .build()?;
/// let result = crew::article_crew("Renewable Energy")?.execute(&adapter).await?;
/// println!("{}", result.output);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    stages: Vec<Task>,
    vars: HashMap<String, String>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.stage_id()).collect::<Vec<_>>(),
            )
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Get a reference to the pipeline's stages.
    pub fn stages(&self) -> &[Task] {
        &self.stages
    }

    /// The `{topic}` variable, if one was set.
    pub fn topic(&self) -> Option<&str> {
        self.vars.get("topic").map(String::as_str)
    }

    /// A fresh run in state `Pending(0)` with an empty context.
    pub fn start(&self) -> PipelineRun<'_> {
        PipelineRun {
            pipeline: self,
            state: RunState::Pending(0),
            context: PipelineContext::new(),
        }
    }

    /// Run every stage against `adapter` and return the final output.
    ///
    /// Use [`start`](Self::start) instead to inspect the state and context
    /// of a run after it fails.
    pub async fn execute(&self, adapter: &EndpointAdapter) -> Result<PipelineResult> {
        self.start().execute(adapter).await
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// One execution of a [`Pipeline`].
///
/// Moves `Pending(0) -> Running(0) -> Pending(1) -> ... -> Completed`, or to
/// `Failed` on the first stage error or on cancellation. The context only
/// ever grows, so after a failure it holds exactly the stages that finished.
#[derive(Debug)]
pub struct PipelineRun<'p> {
    pipeline: &'p Pipeline,
    state: RunState,
    context: PipelineContext,
}

impl PipelineRun<'_> {
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Stages completed so far, in order.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Drive the run to a terminal state.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Aborted`] naming the first stage whose invocation
    ///   failed (including per-call timeouts); later stages are not invoked.
    /// - [`PipelineError::Cancelled`] if the cancellation flag was set before
    ///   a stage started.
    /// - [`PipelineError::Other`] if the run has already finished.
    pub async fn execute(&mut self, adapter: &EndpointAdapter) -> Result<PipelineResult> {
        if self.state.is_terminal() {
            return Err(PipelineError::Other(
                "pipeline run has already finished".to_string(),
            ));
        }

        let pipeline = self.pipeline;
        let handler = &pipeline.event_handler;
        let total_stages = pipeline.stages.len();

        tracing::info!(
            stages = total_stages,
            topic = pipeline.topic().unwrap_or_default(),
            backend = adapter.backend_name(),
            model = adapter.model(),
            "pipeline run started"
        );
        emit(handler, Event::RunStart { total_stages });

        for (idx, task) in pipeline.stages.iter().enumerate() {
            if pipeline.is_cancelled() {
                tracing::info!(completed = idx, "pipeline run cancelled");
                return Err(self.fail(PipelineError::Cancelled { completed: idx }));
            }

            self.state = RunState::Running(idx);
            let stage = task.stage_id().to_string();
            let progress = PipelineProgress {
                stage_index: idx,
                total_stages,
                stage_name: stage.clone(),
                percent: PipelineProgress::percent_for(idx, total_stages),
            };
            tracing::info!(stage = %stage, index = idx, "stage started");
            emit(handler, Event::StageStart(progress.clone()));

            let input = prompt::stage_input(task, &pipeline.vars, &self.context);
            let mut on_token = |chunk: String| {
                emit(
                    handler,
                    Event::Token {
                        stage: stage.clone(),
                        chunk,
                    },
                );
            };
            let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
                emit(
                    handler,
                    Event::TransportRetry {
                        stage: stage.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        reason: reason.to_string(),
                    },
                );
            };
            let hooks = InvokeHooks {
                on_token: Some(&mut on_token),
                on_retry: Some(&mut on_retry),
            };

            let outcome = adapter
                .invoke_with(&input, hooks)
                .await
                .and_then(|raw| {
                    let (thinking, output) = parsing::extract_thinking(&raw);
                    if output.trim().is_empty() {
                        return Err(InvocationError::MalformedResponse(
                            "completion contained only a reasoning block".to_string(),
                        ));
                    }
                    Ok((output, thinking))
                });

            match outcome {
                Ok((output, thinking)) => {
                    tracing::info!(stage = %stage, index = idx, chars = output.len(), "stage finished");
                    self.context.push(task.clone(), output, thinking);
                    self.state = RunState::Pending(idx + 1);
                    emit(
                        handler,
                        Event::StageEnd {
                            progress: PipelineProgress {
                                percent: PipelineProgress::percent_for(idx + 1, total_stages),
                                ..progress
                            },
                            ok: true,
                        },
                    );
                }
                Err(source) => {
                    tracing::error!(stage = %stage, index = idx, kind = source.kind(), error = %source, "stage failed; aborting run");
                    emit(handler, Event::StageEnd { progress, ok: false });
                    return Err(self.fail(PipelineError::Aborted {
                        stage_index: idx,
                        stage,
                        completed: idx,
                        source,
                    }));
                }
            }
        }

        self.state = RunState::Completed;
        let output = self
            .context
            .last_output()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Other("no stages were executed".to_string()))?;
        tracing::info!(stages = total_stages, chars = output.len(), "pipeline run completed");
        emit(handler, Event::RunEnd { ok: true });

        Ok(PipelineResult {
            output,
            context: self.context.clone(),
        })
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.state = RunState::Failed;
        emit(&self.pipeline.event_handler, Event::RunEnd { ok: false });
        err
    }
}

/// Builder for creating pipelines.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Task>,
    vars: HashMap<String, String>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage to the pipeline.
    pub fn add_stage(mut self, task: Task) -> Self {
        self.stages.push(task);
        self
    }

    /// Append several stages in order.
    pub fn stages(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.stages.extend(tasks);
        self
    }

    /// Insert a single template variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set the `{topic}` variable (trimmed).
    pub fn topic(self, topic: impl Into<String>) -> Self {
        let topic = topic.into().trim().to_string();
        self.var("topic", topic)
    }

    /// Set a cancellation flag, checked before each stage starts.
    pub fn cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the pipeline, validating configuration.
    pub fn build(self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(PipelineError::Configuration(
                "pipeline must have at least one stage".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for task in &self.stages {
            if task.stage_id().trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "stage id must not be empty".to_string(),
                ));
            }
            if !seen.insert(task.stage_id()) {
                return Err(PipelineError::Configuration(format!(
                    "duplicate stage id '{}'",
                    task.stage_id()
                )));
            }
        }

        if self.vars.get("topic").is_some_and(|t| t.trim().is_empty()) {
            return Err(PipelineError::Configuration(
                "topic must not be empty".to_string(),
            ));
        }

        Ok(Pipeline {
            stages: self.stages,
            vars: self.vars,
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        })
    }
}
