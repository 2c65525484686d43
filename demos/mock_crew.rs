//! Example: running the article crew against MockBackend, no live LLM.
//!
//! Run with: `cargo run --example mock_crew`

use article_crew::{crew, Article, EndpointAdapter, Event, FnEventHandler, MockBackend};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // One canned reply per stage, returned in order
    let mock = Arc::new(MockBackend::new(vec![
        "Outline: trends, audience, key points, call to action.".into(),
        "# Renewable Energy\n\nA first draft.".into(),
        "# Renewable Energy\n\nThe polished article.".into(),
    ]));

    let adapter = EndpointAdapter::builder("http://unused")
        .backend(mock.clone())
        .model("mock")
        .build()?;

    let handler = Arc::new(FnEventHandler(|event: Event| match event {
        Event::StageStart(p) => println!("[{:>3}%] {} started", p.percent, p.stage_name),
        Event::StageEnd { progress, ok } => {
            println!("[{:>3}%] {} ok={}", progress.percent, progress.stage_name, ok)
        }
        _ => {}
    }));

    let topic = "Renewable Energy";
    let pipeline = crew::article_crew_with(topic, handler, None)?;
    let result = pipeline.execute(&adapter).await?;

    for entry in result.context.entries() {
        println!("--- {} ---\n{}\n", entry.task.stage_id(), entry.output);
    }

    let article = Article::from_result(topic, &result);
    println!("Would download as {} ({})", article.file_name(), article.mime_type());
    println!("Backend received {} calls", mock.call_count());
    Ok(())
}
