use fnews_core::config::{AppConfig, CollectConfig};
use fnews_core::{Article, ArticleStorage, Error, Result, SentimentModel};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::dedup::Deduplicator;
use crate::rate_limiter::RateLimiter;
use crate::requester::{HttpTransport, ReqwestTransport};
use crate::sources::{build_adapters, SourceAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    Merging,
    SentimentBackfill,
    Persisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Completed,
    Panicked,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub fetched: usize,
    pub status: FetchStatus,
}

/// What one collection run did, phase by phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub per_source: Vec<SourceReport>,
    pub fetched: usize,
    pub merged: usize,
    pub sentiment_backfilled: usize,
    pub sentiment_failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub persist_failed: usize,
    pub elapsed_ms: u64,
}

/// Fans a query out to every adapter, merges what comes back, fills in
/// sentiment and upserts the result. Partial failures never fail a run.
pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    sentiment: Arc<dyn SentimentModel>,
    storage: Arc<dyn ArticleStorage>,
    dedup: Deduplicator,
    settings: CollectConfig,
    semaphore: Arc<Semaphore>,
    phase: Mutex<Phase>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        sentiment: Arc<dyn SentimentModel>,
        storage: Arc<dyn ArticleStorage>,
    ) -> Result<Self> {
        if adapters.is_empty() {
            return Err(Error::Config("No source adapters configured".to_string()));
        }
        Ok(Self {
            adapters,
            sentiment,
            storage,
            dedup: Deduplicator::from(&config.dedup),
            semaphore: Arc::new(Semaphore::new(config.collect.max_concurrent_sources.max(1))),
            settings: config.collect.clone(),
            phase: Mutex::new(Phase::Idle),
        })
    }

    /// Wires the real HTTP transport and one rate limiter shared by every
    /// enabled source.
    pub fn from_config(
        config: &AppConfig,
        sentiment: Arc<dyn SentimentModel>,
        storage: Arc<dyn ArticleStorage>,
    ) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport, sentiment, storage)
    }

    pub fn with_transport(
        config: &AppConfig,
        transport: Arc<dyn HttpTransport>,
        sentiment: Arc<dyn SentimentModel>,
        storage: Arc<dyn ArticleStorage>,
    ) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits()));
        let adapters = build_adapters(config, transport, limiter);
        Self::new(config, adapters, sentiment, storage)
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub async fn collect(&self, keyword: &str, days: u32) -> Vec<Article> {
        self.collect_with_report(keyword, days).await.0
    }

    pub async fn collect_with_report(&self, keyword: &str, days: u32) -> (Vec<Article>, CollectReport) {
        let started = std::time::Instant::now();
        let mut report = CollectReport::default();

        self.set_phase(Phase::Fetching);
        info!(
            "🚀 Collecting {:?} over {} days from {} sources",
            keyword,
            days,
            self.adapters.len()
        );
        let (raw, per_source) = self.fetch_all(keyword, days).await;
        report.fetched = raw.len();
        report.per_source = per_source;

        self.set_phase(Phase::Merging);
        let mut articles = self.dedup.merge(raw);
        report.merged = articles.len();
        info!("🧬 {} records merged into {} articles", report.fetched, report.merged);

        self.set_phase(Phase::SentimentBackfill);
        let (backfilled, failed) = self.backfill_sentiment(&mut articles).await;
        report.sentiment_backfilled = backfilled;
        report.sentiment_failed = failed;

        self.set_phase(Phase::Persisting);
        self.persist(&articles, &mut report).await;

        self.set_phase(Phase::Idle);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "✅ Collected {} articles ({} new, {} updated) in {} ms",
            articles.len(),
            report.inserted,
            report.updated,
            report.elapsed_ms
        );
        (articles, report)
    }

    async fn fetch_all(&self, keyword: &str, days: u32) -> (Vec<Article>, Vec<SourceReport>) {
        let deadline = self
            .settings
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let limit = self.settings.per_source_limit;

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = adapter.clone();
                let semaphore = self.semaphore.clone();
                let keyword = keyword.to_string();
                tokio::spawn(async move {
                    // the semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    adapter.fetch(&keyword, days, limit).await
                })
            })
            .collect();

        let mut articles = Vec::new();
        let mut reports = Vec::with_capacity(handles.len());
        for (adapter, mut handle) in self.adapters.iter().zip(handles) {
            let joined = match deadline {
                Some(deadline) => match timeout_at(deadline, &mut handle).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        handle.abort();
                        None
                    }
                },
                None => Some(handle.await),
            };

            let (fetched, status) = match joined {
                Some(Ok(batch)) => {
                    let count = batch.len();
                    articles.extend(batch);
                    (count, FetchStatus::Completed)
                }
                Some(Err(e)) if e.is_panic() => {
                    error!("💥 {} panicked while fetching, contributing nothing", adapter.name());
                    (0, FetchStatus::Panicked)
                }
                Some(Err(e)) => {
                    warn!("⚠️ {} fetch was cancelled: {}", adapter.name(), e);
                    (0, FetchStatus::Cancelled)
                }
                None => {
                    warn!("⏰ {} missed the fetch deadline, contributing nothing", adapter.name());
                    (0, FetchStatus::TimedOut)
                }
            };
            reports.push(SourceReport {
                name: adapter.name().to_string(),
                fetched,
                status,
            });
        }

        (articles, reports)
    }

    /// Returns (filled, left without sentiment).
    async fn backfill_sentiment(&self, articles: &mut [Article]) -> (usize, usize) {
        let pending: Vec<usize> = articles
            .iter()
            .enumerate()
            .filter(|(_, a)| a.sentiment.is_none())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return (0, 0);
        }

        let batch_size = self.settings.sentiment_batch_size.max(1);
        let pause = Duration::from_millis(self.settings.sentiment_pause_ms);
        let max_chars = self.settings.sentiment_max_chars;
        info!(
            "🤖 Scoring sentiment for {} articles with {}",
            pending.len(),
            self.sentiment.name()
        );

        let mut filled = 0;
        let mut failed = 0;
        for (n, batch) in pending.chunks(batch_size).enumerate() {
            if n > 0 && !pause.is_zero() {
                sleep(pause).await;
            }
            let texts: Vec<String> = batch.iter().map(|&i| articles[i].sentiment_text(max_chars)).collect();

            match self.sentiment.analyze_batch(&texts).await {
                Ok(results) => {
                    if results.len() != batch.len() {
                        warn!(
                            "⚠️ {} returned {} results for {} texts",
                            self.sentiment.name(),
                            results.len(),
                            batch.len()
                        );
                    }
                    let mut results = results.into_iter();
                    for &i in batch {
                        match results.next().flatten() {
                            Some(sentiment) if sentiment.is_consistent() => {
                                articles[i].sentiment = Some(sentiment);
                                filled += 1;
                            }
                            Some(_) => {
                                debug!("🗑️ Discarding inconsistent sentiment for {}", articles[i].url);
                                failed += 1;
                            }
                            None => failed += 1,
                        }
                    }
                }
                Err(e) => {
                    warn!("⚠️ Sentiment batch {} failed, leaving {} articles unscored: {}", n + 1, batch.len(), e);
                    failed += batch.len();
                }
            }
        }

        (filled, failed)
    }

    async fn persist(&self, articles: &[Article], report: &mut CollectReport) {
        for article in articles {
            match self.storage.upsert_by_url(article).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    error!("💾 Failed to store {}: {}", article.url, e);
                    report.persist_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use fnews_core::{ArticleQuery, Sentiment, SentimentLabel, SourceType};
    use std::collections::BTreeMap;

    struct StaticAdapter(Vec<Article>);
    struct NullStorage;
    struct SkewedModel;

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn name(&self) -> &str {
            "static"
        }

        fn source_type(&self) -> SourceType {
            SourceType::Feed
        }

        async fn try_fetch(&self, _query: &str, _since_days: u32, _limit: usize) -> Result<Vec<Article>> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl ArticleStorage for NullStorage {
        async fn upsert_by_url(&self, _article: &Article) -> Result<bool> {
            Ok(true)
        }

        async fn search(&self, _query: &ArticleQuery) -> Result<Vec<Article>> {
            Ok(Vec::new())
        }

        async fn get_by_url(&self, _url: &str) -> Result<Option<Article>> {
            Ok(None)
        }
    }

    /// First text gets a consistent result, second an inconsistent one,
    /// the rest nothing.
    #[async_trait]
    impl SentimentModel for SkewedModel {
        fn name(&self) -> &str {
            "skewed"
        }

        async fn analyze_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>> {
            let mut bad = Sentiment::from_label(SentimentLabel::Positive);
            bad.label = SentimentLabel::Negative;
            let mut out = vec![Some(Sentiment::from_label(SentimentLabel::Positive)), Some(bad)];
            out.resize(texts.len(), None);
            Ok(out)
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.collect.sentiment_pause_ms = 0;
        config
    }

    fn article(title: &str, url: &str) -> Article {
        Article::new(title, url, Utc::now(), "static", SourceType::Feed)
    }

    #[test]
    fn test_no_adapters_is_config_error() {
        let result = Orchestrator::new(&config(), Vec::new(), Arc::new(SkewedModel), Arc::new(NullStorage));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle() {
        let adapter = Arc::new(StaticAdapter(vec![article("Gold rallies", "https://x.test/gold")]));
        let orchestrator =
            Orchestrator::new(&config(), vec![adapter], Arc::new(SkewedModel), Arc::new(NullStorage)).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Idle);
        let (articles, report) = orchestrator.collect_with_report("gold", 1).await;
        assert_eq!(orchestrator.phase(), Phase::Idle);
        assert_eq!(articles.len(), 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.per_source[0].status, FetchStatus::Completed);
        assert_eq!(orchestrator.adapter_names(), vec!["static"]);
    }

    #[tokio::test]
    async fn test_backfill_keeps_only_consistent_results() {
        let mut scored = article("Already scored", "https://x.test/0");
        let mut weights = BTreeMap::new();
        weights.insert(SentimentLabel::Neutral, 1.0);
        scored.sentiment = Sentiment::from_distribution(weights);

        let adapter = Arc::new(StaticAdapter(vec![
            scored,
            article("Banks beat estimates", "https://x.test/1"),
            article("Miners slump on weak demand", "https://x.test/2"),
            article("Retail sales flat", "https://x.test/3"),
        ]));
        let orchestrator =
            Orchestrator::new(&config(), vec![adapter], Arc::new(SkewedModel), Arc::new(NullStorage)).unwrap();

        let (articles, report) = orchestrator.collect_with_report("", 1).await;
        assert_eq!(report.sentiment_backfilled, 1);
        assert_eq!(report.sentiment_failed, 2);
        assert!(articles
            .iter()
            .all(|a| a.sentiment.as_ref().map_or(true, Sentiment::is_consistent)));
        let scored = articles.iter().find(|a| a.url == "https://x.test/0").unwrap();
        assert_eq!(scored.sentiment.as_ref().unwrap().label, SentimentLabel::Neutral);
    }
}
