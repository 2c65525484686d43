use crate::task::Task;
use serde::{Deserialize, Serialize};

/// One completed stage: the task that ran and the text it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Position of the stage in the run (0-based).
    pub stage_index: usize,

    /// The task that produced `output`.
    pub task: Task,

    /// Stage output with any reasoning block removed.
    pub output: String,

    /// Reasoning extracted from `<think>` tags, if the model emitted any.
    pub thinking: Option<String>,
}

/// Ordered record of every completed stage in a run.
///
/// Grows by one entry per successful stage and is never rewritten; the only
/// mutator is crate-private.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    entries: Vec<ContextEntry>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, task: Task, output: String, thinking: Option<String>) {
        let stage_index = self.entries.len();
        self.entries.push(ContextEntry {
            stage_index,
            task,
            output,
            thinking,
        });
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ContextEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outputs in stage order.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.output.as_str())
    }

    pub fn last_output(&self) -> Option<&str> {
        self.entries.last().map(|e| e.output.as_str())
    }

    /// Every output so far, in stage order, separated by blank lines.
    ///
    /// This is the accumulated context handed to the next stage.
    pub fn concatenated(&self) -> String {
        self.outputs().collect::<Vec<_>>().join("\n\n")
    }
}

/// Complete pipeline execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Final stage output (markdown prose for the article crew).
    pub output: String,

    /// Every stage in order, for auditing.
    pub context: PipelineContext,
}

/// Progress update emitted at stage transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineProgress {
    /// Current stage index (0-based).
    pub stage_index: usize,

    /// Total number of stages in the pipeline.
    pub total_stages: usize,

    /// Identifier of the current stage.
    pub stage_name: String,

    /// Overall completion, 0 to 100.
    pub percent: u8,
}

impl PipelineProgress {
    /// Percentage of the run complete once `completed` of `total` stages are done.
    pub fn percent_for(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        ((completed.min(total) * 100) / total) as u8
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Waiting to start the stage at this index.
    Pending(usize),
    /// The stage at this index is being invoked.
    Running(usize),
    /// All stages finished.
    Completed,
    /// A stage failed or the run was cancelled.
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn task(id: &str) -> Task {
        Task::new(Role::new(id, id), "do it", "it, done")
    }

    #[test]
    fn test_context_appends_in_order() {
        let mut ctx = PipelineContext::new();
        assert!(ctx.is_empty());
        ctx.push(task("a"), "first".into(), None);
        ctx.push(task("b"), "second".into(), Some("hmm".into()));

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get(0).unwrap().stage_index, 0);
        assert_eq!(ctx.get(1).unwrap().task.stage_id(), "b");
        assert_eq!(ctx.get(1).unwrap().thinking.as_deref(), Some("hmm"));
        assert_eq!(ctx.outputs().collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(ctx.last_output(), Some("second"));
        assert_eq!(ctx.concatenated(), "first\n\nsecond");
    }

    #[test]
    fn test_empty_context_concatenates_to_empty() {
        assert_eq!(PipelineContext::new().concatenated(), "");
    }

    #[test]
    fn test_percent_for() {
        assert_eq!(PipelineProgress::percent_for(0, 3), 0);
        assert_eq!(PipelineProgress::percent_for(1, 3), 33);
        assert_eq!(PipelineProgress::percent_for(2, 3), 66);
        assert_eq!(PipelineProgress::percent_for(3, 3), 100);
        assert_eq!(PipelineProgress::percent_for(5, 3), 100);
        assert_eq!(PipelineProgress::percent_for(0, 0), 100);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Pending(0).is_terminal());
        assert!(!RunState::Running(2).is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }
}
