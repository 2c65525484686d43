//! Stage instructions.

use crate::role::Role;
use serde::{Deserialize, Serialize};

/// Immutable instructions for one stage, assigned to exactly one [`Role`].
///
/// A task is what the pipeline actually runs: its role supplies the persona,
/// its description the instructions, and `expected_output` tells the model
/// what shape the answer should take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    description: String,
    expected_output: String,
    role: Role,
}

impl Task {
    /// Create a task bound to `role`.
    pub fn new(
        role: Role,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            role,
        }
    }

    /// Stage identifier (the assigned role's id).
    pub fn stage_id(&self) -> &str {
        self.role.id()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_follows_role() {
        let role = Role::new("editor", "Editor");
        let task = Task::new(role.clone(), "Proofread", "A polished post");
        assert_eq!(task.stage_id(), "editor");
        assert_eq!(task.role(), &role);
        assert_eq!(task.description(), "Proofread");
        assert_eq!(task.expected_output(), "A polished post");
    }
}
