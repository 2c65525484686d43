//! Example: stream tokens from every stage through a channel.
//!
//! Run with: `cargo run --example streaming_article -- "Renewable Energy"`
//! against a local Ollama (`OLLAMA_URL` overrides the default endpoint).

use article_crew::{
    crew, BackoffConfig, ChannelEventHandler, EndpointAdapter, Event, ProviderConfig, ProviderKind,
};
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let topic = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let config = ProviderConfig::from_env(ProviderKind::Ollama)?;
    let adapter = EndpointAdapter::builder(config.resolved_base_url())
        .model(config.model.clone())
        .timeout(config.timeout())
        .backoff(BackoffConfig::interactive())
        .streaming(true)
        .build()?;

    // Ctrl-C stops the run before the next stage starts
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let (handler, mut rx) = ChannelEventHandler::new();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                Event::StageStart(p) => {
                    let _ = writeln!(stdout, "\n=== [{}%] {} ===", p.percent, p.stage_name);
                }
                Event::Token { chunk, .. } => {
                    let _ = write!(stdout, "{}", chunk);
                    let _ = stdout.flush();
                }
                Event::TransportRetry { attempt, reason, .. } => {
                    eprintln!("\n(retry {}: {})", attempt, reason);
                }
                Event::RunEnd { ok } => {
                    let _ = writeln!(stdout, "\n=== done (ok={}) ===", ok);
                }
                _ => {}
            }
        }
    });

    let pipeline = crew::article_crew_with(topic, Arc::new(handler), Some(cancel))?;
    let outcome = pipeline.execute(&adapter).await;
    drop(pipeline);
    printer.await?;

    let result = outcome?;
    eprintln!("{} stages completed", result.context.len());
    Ok(())
}
