//! citeflow binary entry point.
//!
//! Streams a grounded answer for the query given on the command line.
//! Logging goes to stderr so the streamed answer on stdout stays clean.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use citeflow_client::{GenAiClient, GenAiConfig};
use citeflow_core::{AnnotatedResponse, AppConfig, ContentCache, KeyValueStore, SqliteStore, UsageLedger};
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod consumer;
mod orchestrator;

use consumer::QueryConsumer;
use orchestrator::QueryOrchestrator;

/// Streams plain text as it arrives, then prints the annotated result
/// and its sources once the response resolves.
#[derive(Default)]
struct StdoutConsumer {
    printed: usize,
}

#[async_trait]
impl QueryConsumer for StdoutConsumer {
    async fn on_chunk(&mut self, text: &str, is_complete: bool) {
        if is_complete {
            if self.printed > 0 {
                println!();
            }
            return;
        }
        if text.len() > self.printed {
            print!("{}", &text[self.printed..]);
            let _ = std::io::stdout().flush();
            self.printed = text.len();
        }
    }

    async fn on_response(
        &mut self,
        response: &AnnotatedResponse,
        from_cache: bool,
        cached_at: Option<DateTime<Utc>>,
    ) {
        println!();
        println!("{}", response.text_with_citations);
        if from_cache && let Some(at) = cached_at {
            println!("(cached {})", at.format("%Y-%m-%d %H:%M UTC"));
        }
        if !response.grounding_chunks.is_empty() {
            println!();
            println!("Sources:");
            for (i, chunk) in response.grounding_chunks.iter().enumerate() {
                let uri = chunk.source_uri.as_deref().unwrap_or("(no uri)");
                match &chunk.title {
                    Some(title) => println!("  [{}] {title} - {uri}", i + 1),
                    None => println!("  [{}] {uri}", i + 1),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let mut refresh = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--refresh" => refresh = true,
            _ => words.push(arg),
        }
    }
    let query = words.join(" ");
    if query.trim().is_empty() {
        anyhow::bail!("usage: citeflow [--refresh] <query>");
    }

    let config = AppConfig::load()?;
    tracing::info!(db = %config.db_path.display(), model = %config.model_name, "starting citeflow");

    let store: Arc<dyn KeyValueStore> =
        Arc::new(SqliteStore::open(&config.db_path, config.store_max_bytes).await?);
    let cache = ContentCache::open(Arc::clone(&store), config.cache_ttl_secs).await;
    let ledger = UsageLedger::new(Arc::clone(&store), config.daily_limit, config.unmetered);
    let provider = Arc::new(GenAiClient::new(GenAiConfig::from_app(&config))?);
    let orchestrator = QueryOrchestrator::new(cache.clone(), ledger.clone(), provider, &config);

    let mut consumer = StdoutConsumer::default();
    let outcome = orchestrator.send(&query, refresh, &mut consumer).await;

    let usage = ledger.summary().await;
    let info = cache.info().await;
    println!();
    println!(
        "{outcome:?} | usage {}/{} today | {} cached response(s)",
        usage.used, usage.limit, info.count
    );

    Ok(())
}
