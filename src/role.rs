//! Stage personas.
//!
//! A [`Role`] is the "who" of a stage: a title, the goal the model should
//! pursue, and the backstory that frames its answer. Roles are plain data;
//! [`prompt::stage_input`](crate::prompt::stage_input) turns them into the
//! system message for the model.

use serde::{Deserialize, Serialize};

/// Immutable persona bound to one pipeline stage.
///
/// # Example
///
/// ```
/// use article_crew::Role;
///
/// let role = Role::new("planner", "Content Planner")
///     .with_goal("Plan engaging content about {topic}")
///     .with_backstory("You are planning a blog article.");
/// assert_eq!(role.id(), "planner");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: String,
    title: String,
    goal: String,
    backstory: String,
}

impl Role {
    /// Create a role with an identifier (used as the stage id) and a title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            goal: String::new(),
            backstory: String::new(),
        }
    }

    /// Set the objective. May contain `{topic}` and other `{key}` placeholders.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// Set the persona narrative.
    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn backstory(&self) -> &str {
        &self.backstory
    }
}
