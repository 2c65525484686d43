//! Event system for run lifecycle, progress and streaming hooks.
//!
//! A run emits events when it starts, when each stage starts and ends, for
//! every streamed token, before transport retries, and when it finishes.
//! Implement [`EventHandler`] to receive them for logging, progress bars or
//! streaming UIs.

use crate::types::PipelineProgress;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The run has started.
    RunStart {
        /// Number of stages that will run.
        total_stages: usize,
    },
    /// A stage is about to invoke the model.
    StageStart(PipelineProgress),
    /// A token was received during streaming.
    Token {
        /// Identifier of the stage producing this token.
        stage: String,
        /// The token text.
        chunk: String,
    },
    /// A stage has finished.
    ///
    /// On success `progress.percent` reflects the stages completed so far.
    StageEnd {
        progress: PipelineProgress,
        ok: bool,
    },
    /// A transport-level retry due to an HTTP or network error.
    TransportRetry {
        /// Identifier of the stage being retried.
        stage: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Reason for the retry (error description).
        reason: String,
    },
    /// The run has finished, successfully or not.
    RunEnd { ok: bool },
}

impl Event {
    /// Progress carried by this event, if any.
    pub fn progress(&self) -> Option<&PipelineProgress> {
        match self {
            Event::StageStart(p) | Event::StageEnd { progress: p, .. } => Some(p),
            _ => None,
        }
    }
}

/// Handler for run lifecycle events.
///
/// Entirely optional: pipelines run without an event handler.
///
/// # Example
///
/// ```
/// use article_crew::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::Token { chunk, .. } => print!("{}", chunk),
///             Event::StageStart(p) => println!("[{}%] {}", p.percent, p.stage_name),
///             Event::RunEnd { ok } => println!("done ok={}", ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for every event, in emission order.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use article_crew::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Token { chunk, .. } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// An [`EventHandler`] that forwards events into an unbounded tokio channel,
/// for consumers running on another task.
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEventHandler {
    /// Create a handler and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_event(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
