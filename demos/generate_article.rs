//! Example: generate an article with a real provider and save it.
//!
//! Run with:
//! `GROQ_API_KEY=gsk_... cargo run --example generate_article -- groq "Renewable Energy"`
//!
//! Provider is one of `openai`, `groq`, `ollama`. Set `RUST_LOG=article_crew=debug`
//! for request-level logs.

use anyhow::{bail, Context};
use article_crew::{crew, Article, EndpointAdapter, ProviderConfig, ProviderKind, Readiness};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let kind: ProviderKind = args
        .next()
        .unwrap_or_else(|| "ollama".to_string())
        .parse()?;
    let topic = args.collect::<Vec<_>>().join(" ");

    let config = ProviderConfig::from_env(kind).context("loading provider config")?;
    match config.readiness(&topic) {
        Readiness::Ready => {}
        not_ready => bail!("{}", not_ready),
    }

    eprintln!("Crew:");
    for (name, duty) in crew::roster() {
        eprintln!("  - {}: {}", name, duty);
    }

    let adapter = EndpointAdapter::from_config(&config)?;
    let result = crew::article_crew(topic.as_str())?
        .execute(&adapter)
        .await
        .context("the crew failed; check your API key and try again")?;

    let article = Article::from_result(topic.trim(), &result);
    let path = article.save(".").await?;
    println!("{}", article);
    eprintln!("Saved to {}", path.display());
    Ok(())
}
