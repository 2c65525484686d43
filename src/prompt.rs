//! Prompt assembly for a single stage.
//!
//! [`stage_input`] is the pure mapping from a task (and its role), the
//! run's template variables, and the accumulated context to the text the
//! adapter sends. Nothing here touches the network.

use crate::task::Task;
use crate::types::PipelineContext;
use std::collections::HashMap;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Heading used for the accumulated context section of the user message.
pub const CONTEXT_HEADING: &str = "Context from previous stages";

/// Replace `{key}` placeholders in `template` with values from `vars`.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
/// Unknown placeholders are left as-is.
///
/// # Example
///
/// ```
/// use article_crew::prompt::render;
/// use std::collections::HashMap;
///
/// let vars = HashMap::from([("topic".to_string(), "Solar".to_string())]);
/// let result = render("Write about {topic}, format: {{\"title\": ...}}", &vars);
/// assert_eq!(result, r#"Write about Solar, format: {"title": ...}"#);
/// ```
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    // Pass 1: protect escaped braces
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Pass 2: substitute placeholders
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    // Pass 3: restore escaped braces
    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");
    rendered
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[&str]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Everything the adapter needs for one stage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    /// Stage identifier, for logs and errors.
    pub stage: String,
    /// Rendered persona: title, backstory, goal.
    pub persona: String,
    /// Rendered task description and expected output.
    pub instructions: String,
    /// Outputs of every earlier stage, in order. Empty for the first stage.
    pub context: String,
}

impl StageInput {
    /// System message text.
    pub fn system_prompt(&self) -> &str {
        &self.persona
    }

    /// User message text: instructions, then the accumulated context if any.
    pub fn user_prompt(&self) -> String {
        if self.context.is_empty() {
            self.instructions.clone()
        } else {
            format!(
                "{}\n\n{}",
                self.instructions,
                section(CONTEXT_HEADING, &self.context)
            )
        }
    }
}

/// Build the adapter input for `task` given what earlier stages produced.
pub fn stage_input(
    task: &Task,
    vars: &HashMap<String, String>,
    context: &PipelineContext,
) -> StageInput {
    let role = task.role();

    let mut persona = format!("You are {}.", render(role.title(), vars));
    let backstory = render(role.backstory(), vars);
    if !backstory.is_empty() {
        persona.push('\n');
        persona.push_str(&backstory);
    }
    let goal = render(role.goal(), vars);
    if !goal.is_empty() {
        persona.push_str("\n\nYour personal goal is: ");
        persona.push_str(&goal);
    }

    let mut instructions = render(task.description(), vars);
    let expected = render(task.expected_output(), vars);
    if !expected.is_empty() {
        instructions.push_str("\n\nThis is the expected criteria for your final answer: ");
        instructions.push_str(&expected);
    }

    StageInput {
        stage: task.stage_id().to_string(),
        persona,
        instructions,
        context: context.concatenated(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn vars() -> HashMap<String, String> {
        HashMap::from([("topic".to_string(), "Renewable Energy".to_string())])
    }

    fn writer_task() -> Task {
        Task::new(
            Role::new("writer", "Content Writer")
                .with_goal("Write about {topic}")
                .with_backstory("You write opinion pieces."),
            "Use the plan to write a post on {topic}.",
            "A markdown post.",
        )
    }

    #[test]
    fn test_render_basic() {
        let result = render("Hello {topic}", &vars());
        assert_eq!(result, "Hello Renewable Energy");
    }

    #[test]
    fn test_render_no_placeholders() {
        let result = render("static prompt", &HashMap::new());
        assert_eq!(result, "static prompt");
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        let result = render("{topic} and {audience}", &vars());
        assert_eq!(result, "Renewable Energy and {audience}");
    }

    #[test]
    fn test_render_escaped_braces_no_substitution() {
        let result = render("Output format: {{\"result\": {{\"value\": 42}}}}", &HashMap::new());
        assert_eq!(result, r#"Output format: {"result": {"value": 42}}"#);
    }

    #[test]
    fn test_numbered_list() {
        assert_eq!(numbered_list(&["First", "Second"]), "1. First\n2. Second");
        assert_eq!(numbered_list(&[]), "");
    }

    #[test]
    fn test_section() {
        let result = section("Context", "Some knowledge here");
        assert_eq!(result, "## Context\nSome knowledge here");
    }

    #[test]
    fn test_stage_input_first_stage_has_no_context() {
        let input = stage_input(&writer_task(), &vars(), &PipelineContext::new());
        assert_eq!(input.stage, "writer");
        assert!(input.persona.starts_with("You are Content Writer."));
        assert!(input.persona.contains("You write opinion pieces."));
        assert!(input.persona.contains("Write about Renewable Energy"));
        assert!(input.instructions.contains("post on Renewable Energy."));
        assert!(input.instructions.contains("A markdown post."));
        assert!(input.context.is_empty());
        assert_eq!(input.user_prompt(), input.instructions);
    }

    #[test]
    fn test_stage_input_carries_prior_outputs_in_order() {
        let mut ctx = PipelineContext::new();
        ctx.push(writer_task(), "P-out".into(), None);
        ctx.push(writer_task(), "W-out".into(), None);

        let input = stage_input(&writer_task(), &vars(), &ctx);
        assert_eq!(input.context, "P-out\n\nW-out");

        let user = input.user_prompt();
        let heading = user.find(CONTEXT_HEADING).unwrap();
        let p = user.find("P-out").unwrap();
        let w = user.find("W-out").unwrap();
        assert!(heading < p && p < w);
    }
}
