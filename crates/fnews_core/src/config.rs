//! Static configuration, read once at startup and passed down explicitly.
//!
//! Everything has a default so a YAML file only needs to name what it changes:
//!
//! ```yaml
//! dedup:
//!   title_similarity: 85
//! sources:
//!   - name: vendor_a
//!     kind: vendor_a
//!     api_key_env: FNEWS_VENDOR_A_KEY
//!     rate_limit: { per_minute: 5, per_day: 500 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::types::SourceType;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: Vec<SourceConfig>,
    pub dedup: DedupConfig,
    pub http: HttpConfig,
    pub collect: CollectConfig,
    pub sentiment: SentimentConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            dedup: DedupConfig::default(),
            http: HttpConfig::default(),
            collect: CollectConfig::default(),
            sentiment: SentimentConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: AppConfig = serde_yaml::from_str(yaml)?;
        config.resolve_env();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Fills `api_key` from `api_key_env` where the key is not set inline.
    pub fn resolve_env(&mut self) {
        for source in &mut self.sources {
            if source.api_key.is_none() {
                if let Some(var) = &source.api_key_env {
                    source.api_key = std::env::var(var).ok().filter(|k| !k.is_empty());
                }
            }
        }
        if self.sentiment.api_key.is_none() {
            self.sentiment.api_key = std::env::var("FNEWS_SENTIMENT_KEY").ok();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dedup.title_similarity > 100 {
            return Err(Error::Config(format!(
                "dedup.title_similarity must be within 0..=100, got {}",
                self.dedup.title_similarity
            )));
        }
        if self.collect.sentiment_batch_size == 0 {
            return Err(Error::Config("collect.sentiment_batch_size must be positive".to_string()));
        }
        if self.enabled_sources().next().is_none() {
            return Err(Error::Config("No sources are enabled".to_string()));
        }
        for source in self.enabled_sources() {
            match source.kind {
                SourceType::VendorA | SourceType::VendorB if source.api_key.is_none() => {
                    return Err(Error::Config(format!("Source {} requires an API key", source.name)));
                }
                SourceType::Feed if source.feeds.is_empty() => {
                    return Err(Error::Config(format!("Feed source {} lists no feeds", source.name)));
                }
                _ => {}
            }
            if let Some(base) = &source.base_url {
                url::Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{}: {}", base, e)))?;
            }
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Rate-limit ceilings keyed by source name, for the shared limiter.
    pub fn rate_limits(&self) -> HashMap<String, RateLimit> {
        self.enabled_sources()
            .filter(|s| !s.rate_limit.is_unlimited())
            .map(|s| (s.name.clone(), s.rate_limit.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, kind: SourceType) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            base_url: None,
            api_key: None,
            api_key_env: None,
            rate_limit: RateLimit::default(),
            max_pages: default_max_pages(),
            page_size: default_page_size(),
            feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default)]
    pub per_minute: Option<u32>,
    #[serde(default)]
    pub per_day: Option<u32>,
}

impl RateLimit {
    pub fn new(per_minute: Option<u32>, per_day: Option<u32>) -> Self {
        Self { per_minute, per_day }
    }

    pub fn is_unlimited(&self) -> bool {
        self.per_minute.is_none() && self.per_day.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl FeedConfig {
    pub fn new(name: &str, url: &str, categories: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Title similarity metric used by the deduplicator. All score in 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Normalized Levenshtein over the whole title.
    #[default]
    Ratio,
    /// Normalized Levenshtein after sorting the title's words.
    TokenSort,
    JaroWinkler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub title_similarity: u8,
    pub time_window_secs: u64,
    pub metric: SimilarityMetric,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_similarity: 90,
            time_window_secs: 300,
            metric: SimilarityMetric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub initial_wait_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_retries: 3,
            backoff_factor: 2.0,
            initial_wait_ms: 1000,
            max_jitter_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub per_source_limit: usize,
    pub max_concurrent_sources: usize,
    /// Upper bound on the whole fetch phase. `None` waits for every source.
    pub deadline_secs: Option<u64>,
    pub sentiment_batch_size: usize,
    pub sentiment_pause_ms: u64,
    pub sentiment_max_chars: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            per_source_limit: 100,
            max_concurrent_sources: 8,
            deadline_secs: Some(120),
            sentiment_batch_size: 10,
            sentiment_pause_ms: 500,
            sentiment_max_chars: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// `lexicon` or `http`.
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            model: "lexicon".to_string(),
            endpoint: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `sqlite`.
    pub backend: String,
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> usize {
    5
}

fn default_page_size() -> usize {
    50
}

fn default_sources() -> Vec<SourceConfig> {
    let mut feeds = SourceConfig::new("feeds", SourceType::Feed);
    feeds.feeds = vec![
        FeedConfig::new(
            "CNBC",
            "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=10000664",
            &["markets", "finance"],
        ),
        FeedConfig::new(
            "MarketWatch",
            "https://feeds.content.dowjones.io/public/rss/mw_topstories",
            &["markets"],
        ),
        FeedConfig::new(
            "Yahoo Finance",
            "https://finance.yahoo.com/news/rssindex",
            &["markets", "finance"],
        ),
        FeedConfig::new(
            "Federal Reserve",
            "https://www.federalreserve.gov/feeds/press_all.xml",
            &["economics", "fed"],
        ),
    ];

    let mut vendor_a = SourceConfig::new("vendor_a", SourceType::VendorA);
    vendor_a.enabled = false;
    vendor_a.base_url = Some("https://api.polygon.io".to_string());
    vendor_a.api_key_env = Some("FNEWS_VENDOR_A_KEY".to_string());
    vendor_a.rate_limit = RateLimit::new(Some(5), None);

    let mut vendor_b = SourceConfig::new("vendor_b", SourceType::VendorB);
    vendor_b.enabled = false;
    vendor_b.base_url = Some("https://api.marketaux.com".to_string());
    vendor_b.api_key_env = Some("FNEWS_VENDOR_B_KEY".to_string());
    vendor_b.rate_limit = RateLimit::new(None, Some(100));
    vendor_b.page_size = 3;

    let mut events = SourceConfig::new("events", SourceType::Events);
    events.base_url = Some("https://api.gdeltproject.org".to_string());
    events.rate_limit = RateLimit::new(Some(12), None);
    events.max_pages = 1;
    events.page_size = 75;

    vec![feeds, vendor_a, vendor_b, events]
}
