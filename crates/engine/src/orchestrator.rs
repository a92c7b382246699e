//! Query pipeline: configuration gate, cache, quota, stream, persistence.

use crate::consumer::QueryConsumer;
use citeflow_client::{GenerateRequest, GenerativeProvider, StreamCoordinator};
use citeflow_core::{AnnotatedResponse, AppConfig, ContentCache, Error, UsageLedger, UsageSummary};
use std::sync::Arc;

/// How a query was ultimately answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// No API key; nothing was attempted.
    NotConfigured,
    /// Replayed from the response cache; no quota was consumed.
    CacheHit,
    /// Daily allowance exhausted before the call.
    LimitReached,
    /// Streamed from the provider, cached, and charged.
    Fresh,
    /// Rejected input or a provider failure; nothing cached or charged.
    Failed,
}

/// Runs queries end to end against a cache, a usage ledger, and a provider.
///
/// The gate order is fixed: unconfigured provider first, then cache (a hit
/// bypasses the quota check entirely), then the daily limit, then the
/// provider stream. Only a stream that drains to completion writes the
/// cache and charges the ledger, and it does each exactly once.
#[derive(Clone)]
pub struct QueryOrchestrator {
    cache: ContentCache,
    ledger: UsageLedger,
    provider: Arc<dyn GenerativeProvider>,
    model_name: String,
    temperature: f64,
    instructions: Option<String>,
}

impl QueryOrchestrator {
    pub fn new(
        cache: ContentCache,
        ledger: UsageLedger,
        provider: Arc<dyn GenerativeProvider>,
        config: &AppConfig,
    ) -> Self {
        Self {
            cache,
            ledger,
            provider,
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            instructions: config.instructions.clone(),
        }
    }

    /// Send one query, driving `consumer` with progressive text and the
    /// final annotated response. `force_refresh` skips the cache lookup;
    /// the fresh result still overwrites the cached entry.
    pub async fn send(
        &self,
        query: &str,
        force_refresh: bool,
        consumer: &mut dyn QueryConsumer,
    ) -> SendOutcome {
        let query = query.trim();
        if query.is_empty() {
            let error = Error::InvalidInput("query must not be empty".into());
            return self.notice(consumer, &error, SendOutcome::Failed).await;
        }

        if !self.provider.is_configured() {
            return self.notice(consumer, &Error::NotConfigured, SendOutcome::NotConfigured).await;
        }

        if !force_refresh
            && let Some(hit) = self.cache.get_with_timestamp(query).await
        {
            tracing::debug!(query, "serving cached response");
            consumer.on_chunk(&hit.payload.text_with_citations, true).await;
            consumer.on_response(&hit.payload, true, Some(hit.created_at)).await;
            return SendOutcome::CacheHit;
        }

        if self.ledger.has_reached_limit().await {
            let UsageSummary { used, limit, .. } = self.ledger.summary().await;
            let error = Error::QuotaExceeded { used, limit };
            return self.notice(consumer, &error, SendOutcome::LimitReached).await;
        }

        let request = GenerateRequest {
            prompt: query.to_string(),
            instructions: self.instructions.clone(),
            model_name: self.model_name.clone(),
            temperature: self.temperature,
        };
        tracing::debug!(model = %self.model_name, "opening provider stream");
        let mut session = StreamCoordinator::open(Arc::clone(&self.provider), request).await;

        let mut accumulated = String::new();
        while let Some(chunk) = session.next_chunk().await {
            if chunk.is_final {
                break;
            }
            accumulated.push_str(&chunk.delta_text);
            consumer.on_chunk(&accumulated, false).await;
        }

        let outcome = session.full_response().await;
        if outcome.completed {
            self.cache.put(query, &outcome.response).await;
            if let Err(e) = self.ledger.record_success().await {
                tracing::warn!(error = %e, "failed to record usage");
            }
        }
        consumer.on_chunk(&outcome.response.text_with_citations, true).await;
        consumer.on_response(&outcome.response, false, None).await;

        if outcome.completed { SendOutcome::Fresh } else { SendOutcome::Failed }
    }

    async fn notice(
        &self,
        consumer: &mut dyn QueryConsumer,
        error: &Error,
        outcome: SendOutcome,
    ) -> SendOutcome {
        let response = AnnotatedResponse::plain(error.to_string());
        consumer.on_chunk(&response.text_with_citations, true).await;
        consumer.on_response(&response, false, None).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use citeflow_client::{EventStream, ProviderError, StreamEvent};
    use citeflow_core::grounding::{GroundingChunk, GroundingMetadata, GroundingSupport, Segment};
    use citeflow_core::{KeyValueStore, MemoryStore};
    use futures_util::StreamExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingConsumer {
        chunks: Vec<(String, bool)>,
        responses: Vec<(AnnotatedResponse, bool, Option<DateTime<Utc>>)>,
    }

    #[async_trait]
    impl QueryConsumer for RecordingConsumer {
        async fn on_chunk(&mut self, text: &str, is_complete: bool) {
            self.chunks.push((text.to_string(), is_complete));
        }

        async fn on_response(
            &mut self,
            response: &AnnotatedResponse,
            from_cache: bool,
            cached_at: Option<DateTime<Utc>>,
        ) {
            self.responses.push((response.clone(), from_cache, cached_at));
        }
    }

    /// Plays back a fixed script, counting how many calls it served.
    struct ScriptedProvider {
        scripts: Mutex<Vec<Vec<Result<StreamEvent, ProviderError>>>>,
        calls: AtomicU32,
        configured: bool,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<Result<StreamEvent, ProviderError>>>) -> Arc<Self> {
            Arc::new(Self { scripts: Mutex::new(scripts), calls: AtomicU32::new(0), configured: true })
        }

        fn unconfigured() -> Arc<Self> {
            Arc::new(Self { scripts: Mutex::new(Vec::new()), calls: AtomicU32::new(0), configured: false })
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn stream_generate(&self, _request: &GenerateRequest) -> Result<EventStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            assert!(!scripts.is_empty(), "provider called more times than scripted");
            Ok(futures_util::stream::iter(scripts.remove(0)).boxed())
        }
    }

    /// Never resolves; models an in-flight call that gets abandoned.
    struct PendingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerativeProvider for PendingProvider {
        fn is_configured(&self) -> bool {
            true
        }

        async fn stream_generate(&self, _request: &GenerateRequest) -> Result<EventStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(futures_util::stream::pending().boxed())
        }
    }

    fn delta(text: &str) -> Result<StreamEvent, ProviderError> {
        Ok(StreamEvent { text: Some(text.to_string()), grounding: None })
    }

    fn grounded(uri: &str, end_offset: usize) -> Result<StreamEvent, ProviderError> {
        Ok(StreamEvent {
            text: None,
            grounding: Some(GroundingMetadata {
                search_queries: vec!["climate".into()],
                chunks: vec![GroundingChunk { source_uri: Some(uri.to_string()), title: None }],
                supports: vec![GroundingSupport {
                    segment: Some(Segment { start_offset: 0, end_offset, text: String::new() }),
                    source_indices: vec![0],
                }],
                search_entry_point: None,
            }),
        })
    }

    fn config() -> AppConfig {
        AppConfig {
            api_key: Some("test-key".into()),
            model_name: "gemini-2.5-flash".into(),
            temperature: 0.7,
            ..AppConfig::default()
        }
    }

    async fn fixture(
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn GenerativeProvider>,
        daily_limit: u32,
    ) -> (QueryOrchestrator, ContentCache, UsageLedger) {
        let cache = ContentCache::open(Arc::clone(&store), 604_800).await;
        let ledger = UsageLedger::new(store, daily_limit, false);
        let orchestrator = QueryOrchestrator::new(cache.clone(), ledger.clone(), provider, &config());
        (orchestrator, cache, ledger)
    }

    async fn seed_usage(store: &dyn KeyValueStore, count: u32) {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        store
            .set("citeflow_api_usage", &format!("{{\"day\":\"{day}\",\"count\":{count}}}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_climate_news_end_to_end() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        seed_usage(store.as_ref(), 5).await;
        let provider =
            ScriptedProvider::new(vec![vec![delta("Emissions "), delta("rose."), grounded("https://x", 16)]]);
        let (orchestrator, cache, ledger) = fixture(store, provider, 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("latest climate news", false, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::Fresh);
        assert_eq!(consumer.chunks[0], ("Emissions ".to_string(), false));
        assert_eq!(consumer.chunks[1], ("Emissions rose.".to_string(), false));
        // End offset 16 clamps to the 15-byte text.
        assert_eq!(consumer.chunks[2], ("Emissions rose. [1](https://x)".to_string(), true));

        let (response, from_cache, cached_at) = &consumer.responses[0];
        assert_eq!(response.text_with_citations, "Emissions rose. [1](https://x)");
        assert!(!from_cache);
        assert!(cached_at.is_none());

        assert_eq!(cache.list_all().await.len(), 1);
        assert_eq!(ledger.summary().await.used, 6);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_quota_and_provider() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::new(vec![vec![delta("answer")]]);
        let (orchestrator, _cache, ledger) = fixture(store.clone(), provider.clone(), 20).await;

        let mut consumer = RecordingConsumer::default();
        assert_eq!(orchestrator.send("Query", false, &mut consumer).await, SendOutcome::Fresh);

        // Exhaust the allowance; the cached query must still be answerable.
        seed_usage(store.as_ref(), 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("  query  ", false, &mut consumer).await;
        assert_eq!(outcome, SendOutcome::CacheHit);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(consumer.chunks, vec![("answer".to_string(), true)]);
        let (_, from_cache, cached_at) = &consumer.responses[0];
        assert!(from_cache);
        assert!(cached_at.is_some());
        assert_eq!(ledger.summary().await.used, 20);
    }

    #[tokio::test]
    async fn test_limit_reached_yields_notice() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        seed_usage(store.as_ref(), 20).await;
        let provider = ScriptedProvider::new(vec![]);
        let (orchestrator, cache, _ledger) = fixture(store, provider.clone(), 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("fresh question", false, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::LimitReached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(consumer.chunks[0].0.contains("daily limit reached"));
        assert!(consumer.chunks[0].1);
        assert_eq!(cache.list_all().await.len(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_short_circuits() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::unconfigured();
        let (orchestrator, cache, ledger) = fixture(store, provider.clone(), 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("anything", false, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::NotConfigured);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(consumer.chunks[0].0.contains("CITEFLOW_API_KEY"));
        assert_eq!(cache.list_all().await.len(), 0);
        assert_eq!(ledger.summary().await.used, 0);
    }

    #[tokio::test]
    async fn test_failed_stream_not_cached_or_charged() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::new(vec![vec![delta("partial"), Err(ProviderError::Timeout)]]);
        let (orchestrator, cache, ledger) = fixture(store, provider, 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("flaky", false, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::Failed);
        assert_eq!(cache.list_all().await.len(), 0);
        assert_eq!(ledger.summary().await.used, 0);
        let last = consumer.chunks.last().unwrap();
        assert!(last.1);
        assert!(last.0.contains("Error generating response"));
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache_and_overwrites() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::new(vec![vec![delta("first")], vec![delta("second")]]);
        let (orchestrator, cache, ledger) = fixture(store, provider.clone(), 20).await;

        let mut consumer = RecordingConsumer::default();
        orchestrator.send("q", false, &mut consumer).await;
        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("q", true, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::Fresh);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("q").await.unwrap().text, "second");
        assert_eq!(cache.list_all().await.len(), 1);
        assert_eq!(ledger.summary().await.used, 2);
    }

    #[tokio::test]
    async fn test_usage_recorded_exactly_once_per_send() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::new(vec![vec![delta("a"), delta("b"), grounded("https://s", 2)]]);
        let (orchestrator, _cache, ledger) = fixture(store, provider, 20).await;

        let mut consumer = RecordingConsumer::default();
        orchestrator.send("once", false, &mut consumer).await;

        assert_eq!(ledger.summary().await.used, 1);
        assert_eq!(consumer.responses.len(), 1);
        assert_eq!(consumer.chunks.iter().filter(|(_, complete)| *complete).count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_send_leaves_state_untouched() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = Arc::new(PendingProvider { calls: AtomicU32::new(0) });
        let (orchestrator, cache, ledger) = fixture(store, provider.clone(), 20).await;

        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                let mut consumer = RecordingConsumer::default();
                orchestrator.send("doomed", false, &mut consumer).await
            }
        });
        // Let the send reach the provider before tearing it down.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        task.abort();
        assert!(task.await.is_err());

        assert_eq!(cache.list_all().await.len(), 0);
        assert_eq!(ledger.summary().await.used, 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::new(vec![]);
        let (orchestrator, _cache, _ledger) = fixture(store, provider.clone(), 20).await;

        let mut consumer = RecordingConsumer::default();
        let outcome = orchestrator.send("   ", false, &mut consumer).await;

        assert_eq!(outcome, SendOutcome::Failed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(consumer.chunks[0].0.contains("empty"));
    }
}
