//! The finished article as a downloadable markdown file.

use crate::error::Result;
use crate::parsing::unwrap_markdown_fence;
use crate::types::PipelineResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Media type for [`Article::markdown`].
pub const MIME_TYPE: &str = "text/markdown";

/// Markdown article produced by a crew run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub topic: String,
    pub markdown: String,
}

impl Article {
    pub fn new(topic: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            markdown: markdown.into(),
        }
    }

    /// Article from a finished run's final output, with any wrapping code
    /// fence removed.
    pub fn from_result(topic: impl Into<String>, result: &PipelineResult) -> Self {
        Self::new(topic, unwrap_markdown_fence(&result.output))
    }

    /// Download name: the trimmed topic with spaces and path separators
    /// replaced by `_`, plus `_article.md`.
    ///
    /// ```
    /// use article_crew::Article;
    ///
    /// let article = Article::new("Renewable Energy", "# Renewable Energy");
    /// assert_eq!(article.file_name(), "Renewable_Energy_article.md");
    /// ```
    pub fn file_name(&self) -> String {
        let stem: String = self
            .topic
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        format!("{}_article.md", stem)
    }

    pub fn mime_type(&self) -> &'static str {
        MIME_TYPE
    }

    /// Write the article into `dir` under [`file_name`](Self::file_name).
    ///
    /// Returns the full path written. Creates `dir` if needed and
    /// overwrites an existing file of the same name.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, self.markdown.as_bytes()).await?;
        tracing::info!(path = %path.display(), bytes = self.markdown.len(), "article saved");
        Ok(path)
    }
}

impl std::fmt::Display for Article {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.markdown)
    }
}
