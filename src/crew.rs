//! The article crew: a content planner, a writer and an editor.
//!
//! Roles and tasks are built fresh from the run's topic, so the context
//! recorded for each stage carries the objectives that were actually sent.

use crate::error::Result;
use crate::events::EventHandler;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::prompt::numbered_list;
use crate::role::Role;
use crate::task::Task;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub const PLANNER: &str = "planner";
pub const WRITER: &str = "writer";
pub const EDITOR: &str = "editor";

/// One-line duty per crew member, in stage order.
const ROSTER: [(&str, &str); 3] = [
    ("Planner", "Researches the topic and creates an outline"),
    ("Writer", "Writes the article based on the plan"),
    ("Editor", "Polishes the article for publication"),
];

/// `(name, duty)` for each crew member, in the order they run.
pub fn roster() -> &'static [(&'static str, &'static str)] {
    &ROSTER
}

pub fn planner(topic: &str) -> Role {
    Role::new(PLANNER, "Content Planner")
        .with_goal(format!("Plan engaging and factually accurate content on {topic}"))
        .with_backstory(format!(
            "You're working on planning a blog article about the topic: {topic}. \
             You collect information that helps the audience learn something \
             and make informed decisions. Your work is the basis for the \
             Content Writer to write an article on this topic."
        ))
}

pub fn writer(topic: &str) -> Role {
    Role::new(WRITER, "Content Writer")
        .with_goal(format!(
            "Write an insightful and factually accurate opinion piece about the topic: {topic}"
        ))
        .with_backstory(format!(
            "You're working on writing a new opinion piece about the topic: {topic}. \
             You base your writing on the work of the Content Planner, who provides \
             an outline and relevant context about the topic. You follow the main \
             objectives and direction of the outline as provided by the Content \
             Planner. You also provide objective and impartial insights and back \
             them up with information provided by the Content Planner. You \
             acknowledge in your opinion piece when your statements are opinions \
             as opposed to objective statements."
        ))
}

pub fn editor() -> Role {
    Role::new(EDITOR, "Editor")
        .with_goal("Edit a given blog post to align with the writing style of the organization.")
        .with_backstory(
            "You are an editor who receives a blog post from the Content Writer. \
             Your goal is to review the blog post to ensure that it follows \
             journalistic best practices, provides balanced viewpoints when \
             providing opinions or assertions, and also avoids major \
             controversial topics or opinions when possible.",
        )
}

pub fn plan_task(topic: &str) -> Task {
    Task::new(
        planner(topic),
        numbered_list(&[
            &format!("Prioritize the latest trends, key players, and noteworthy news on {topic}."),
            "Identify the target audience, considering their interests and pain points.",
            "Develop a detailed content outline including an introduction, key points, and a call to action.",
            "Include SEO keywords and relevant data or sources.",
        ]),
        "A comprehensive content plan document with an outline, audience analysis, \
         SEO keywords, and resources.",
    )
}

pub fn write_task(topic: &str) -> Task {
    Task::new(
        writer(topic),
        numbered_list(&[
            &format!("Use the content plan to craft a compelling blog post on {topic}."),
            "Incorporate SEO keywords naturally.",
            "Name sections and subtitles properly and in an engaging manner.",
            "Ensure the post is structured with an engaging introduction, insightful body, and a summarizing conclusion.",
            "Proofread for grammatical errors and alignment with the brand's voice.",
        ]),
        "A well-written blog post in markdown format, ready for publication, \
         each section should have 2 or 3 paragraphs.",
    )
}

pub fn edit_task() -> Task {
    Task::new(
        editor(),
        "Proofread the given blog post for grammatical errors and alignment \
         with the brand's voice.",
        "A well-written blog post in markdown format, ready for publication, \
         each section should have 2 or 3 paragraphs.",
    )
}

/// Planner, writer and editor tasks for `topic`, in run order.
pub fn tasks(topic: &str) -> Vec<Task> {
    vec![plan_task(topic), write_task(topic), edit_task()]
}

/// Builder preloaded with the three crew stages and `topic`.
///
/// Use this to attach a cancellation flag or event handler before building.
pub fn builder(topic: impl Into<String>) -> PipelineBuilder {
    let topic = topic.into();
    Pipeline::builder()
        .stages(tasks(topic.trim()))
        .topic(topic)
}

/// The three-stage article pipeline for `topic`.
///
/// # Errors
///
/// Returns a configuration error if `topic` is empty after trimming.
///
/// # Example
///
/// ```
/// let pipeline = article_crew::crew::article_crew("Renewable Energy").unwrap();
/// assert_eq!(pipeline.stages().len(), 3);
/// assert!(article_crew::crew::article_crew("   ").is_err());
/// ```
pub fn article_crew(topic: impl Into<String>) -> Result<Pipeline> {
    builder(topic).build()
}

/// [`article_crew`] with an event handler and an optional cancellation flag.
pub fn article_crew_with(
    topic: impl Into<String>,
    handler: Arc<dyn EventHandler>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<Pipeline> {
    let mut builder = builder(topic).event_handler(handler);
    if let Some(flag) = cancel {
        builder = builder.cancellation(flag);
    }
    builder.build()
}
