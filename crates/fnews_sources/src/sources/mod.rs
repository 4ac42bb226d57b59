use async_trait::async_trait;
use fnews_core::config::{AppConfig, SourceConfig};
use fnews_core::{Article, Error, Result, SourceType};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::logging::Logger;
use crate::rate_limiter::RateLimiter;
use crate::requester::{random_user_agent, HttpResponse, HttpTransport, ResilientRequester, RetryPolicy};

pub mod events;
pub mod feed;
pub mod vendor_a;
pub mod vendor_b;

pub use events::EventsAdapter;
pub use feed::FeedAdapter;
pub use vendor_a::VendorAAdapter;
pub use vendor_b::VendorBAdapter;

/// One upstream, fetched and normalized into [`Article`]s.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Configured source name, also the rate-limiter key.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Fetch and map. May fail; callers normally want [`SourceAdapter::fetch`].
    async fn try_fetch(&self, query: &str, since_days: u32, limit: usize) -> Result<Vec<Article>>;

    /// Never fails: an upstream problem is logged and yields nothing.
    /// Records without a title or url never make it out.
    async fn fetch(&self, query: &str, since_days: u32, limit: usize) -> Vec<Article> {
        match self.try_fetch(query, since_days, limit).await {
            Ok(mut articles) => {
                let raw = articles.len();
                articles.retain(Article::is_valid);
                articles.truncate(limit);
                if raw != articles.len() {
                    debug!("🗑️ {} dropped {} records", self.name(), raw - articles.len());
                }
                info!("🦗 {} returned {} articles", self.name(), articles.len());
                articles
            }
            Err(e) => {
                warn!("⚠️ {} unavailable, contributing nothing: {}", self.name(), e);
                Vec::new()
            }
        }
    }
}

/// What every adapter owns: its config, its own requester and headers, and
/// a handle on the shared rate limiter.
pub struct SourceContext {
    pub config: SourceConfig,
    requester: ResilientRequester,
    limiter: Arc<RateLimiter>,
    pub logger: Logger,
}

impl SourceContext {
    pub fn new(config: SourceConfig, requester: ResilientRequester, limiter: Arc<RateLimiter>) -> Self {
        let logger = Logger::for_source(&config.name);
        Self {
            config,
            requester,
            limiter,
            logger,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn base_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }

    pub fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config(format!("Source {} has no API key", self.config.name)))
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".to_string(), random_user_agent().to_string()),
            (
                "Accept".to_string(),
                "application/json, application/rss+xml, application/xml;q=0.9, */*;q=0.8".to_string(),
            ),
        ]
    }

    /// One logical request: quota first, then the retrying requester.
    pub async fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse> {
        if !self.limiter.try_acquire(self.name()) {
            return Err(Error::RateLimited(self.name().to_string()));
        }
        self.requester.get(url, params, &self.headers()).await
    }

    /// A failed first page fails the source; a later one only ends
    /// pagination, keeping what earlier pages returned.
    pub(crate) fn contain_page_error(&self, page: usize, error: Error) -> Result<()> {
        if page == 0 {
            return Err(error);
        }
        self.logger.warn(&format!(
            "page {} failed, keeping {} earlier pages: {}",
            page + 1,
            page,
            error
        ));
        Ok(())
    }

    pub(crate) fn parse_page<T: serde::de::DeserializeOwned>(&self, body: &str) -> Result<T> {
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("{} sent an unexpected body: {}", self.name(), e)))
    }
}

/// Builds one adapter per enabled source, sharing the limiter and transport.
pub fn build_adapters(
    config: &AppConfig,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
) -> Vec<Arc<dyn SourceAdapter>> {
    let policy = RetryPolicy::from(&config.http);
    config
        .enabled_sources()
        .map(|source| {
            let requester = ResilientRequester::new(transport.clone(), policy.clone());
            let ctx = SourceContext::new(source.clone(), requester, limiter.clone());
            let adapter: Arc<dyn SourceAdapter> = match source.kind {
                SourceType::Feed => Arc::new(FeedAdapter::new(ctx)),
                SourceType::VendorA => Arc::new(VendorAAdapter::new(ctx)),
                SourceType::VendorB => Arc::new(VendorBAdapter::new(ctx)),
                SourceType::Events => Arc::new(EventsAdapter::new(ctx)),
            };
            adapter
        })
        .collect()
}

/// Common utilities for adapters
pub(crate) mod utils {
    use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
    use fnews_core::Article;
    use scraper::Html;
    use url::Url;

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y%m%dT%H%M%SZ",
        "%Y%m%dT%H%M%S",
        "%Y-%m-%dT%H:%M",
    ];

    /// RFC 3339, RFC 2822, a handful of offset-less layouts read as UTC,
    /// then unix seconds.
    pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
        if raw.len() >= 9 && raw.chars().all(|c| c.is_ascii_digit()) {
            return raw.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        }
        None
    }

    pub fn strip_html(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Host without a leading `www.`.
    pub fn domain_of(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        Some(host.trim_start_matches("www.").to_string())
    }

    pub fn since_cutoff(since_days: u32) -> DateTime<Utc> {
        Utc::now() - Duration::days(i64::from(since_days))
    }

    /// Case-insensitive match on title, summary or content. An empty query
    /// matches everything.
    pub fn matches_query(article: &Article, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        article.title.to_lowercase().contains(&query)
            || article
                .summary
                .as_deref()
                .map_or(false, |s| s.to_lowercase().contains(&query))
            || article.content.to_lowercase().contains(&query)
    }

    /// `AAPL`, `BRK.B`: upper-case, short, no spaces.
    pub fn is_ticker_like(query: &str) -> bool {
        let query = query.trim();
        !query.is_empty()
            && query.len() <= 6
            && query
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '.' || c.is_ascii_digit())
            && query.chars().next().map_or(false, |c| c.is_ascii_uppercase())
    }

    pub fn non_empty(s: Option<String>) -> Option<String> {
        s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::utils;
    use super::*;
    use crate::test_utils::{article_at, context_with_limiter, MockTransport};
    use chrono::{Datelike, TimeZone, Timelike, Utc};
    use fnews_core::config::RateLimit;
    use std::collections::HashMap;

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 20, 14, 30, 0).unwrap();
        for raw in [
            "2024-03-20T14:30:00Z",
            "2024-03-20T16:30:00+02:00",
            "Wed, 20 Mar 2024 14:30:00 GMT",
            "Wed, 20 Mar 2024 10:30:00 -0400",
            "2024-03-20 14:30:00",
            "20240320T143000Z",
            "20240320T143000",
            "2024-03-20T14:30:00.000000",
            "1710945000",
        ] {
            assert_eq!(utils::parse_datetime(raw), Some(expected), "{}", raw);
        }
        assert_eq!(utils::parse_datetime("yesterday"), None);
        assert_eq!(utils::parse_datetime(""), None);
    }

    #[test]
    fn test_parse_datetime_keeps_fraction() {
        let dt = utils::parse_datetime("2024-03-20T14:30:00.250Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_strip_html() {
        let text = utils::strip_html("<p>Stocks <b>rally</b>\n as   yields fall</p><img src=\"x.png\">");
        assert_eq!(text, "Stocks rally as yields fall");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(utils::domain_of("https://www.reuters.com/markets/x").as_deref(), Some("reuters.com"));
        assert_eq!(utils::domain_of("not a url"), None);
    }

    #[test]
    fn test_matches_query() {
        let mut article = article_at("Nvidia extends rally", "https://x.com/a", "A", Utc::now());
        article.summary = Some("Chipmakers gain on AI demand".to_string());
        assert!(utils::matches_query(&article, "nvidia"));
        assert!(utils::matches_query(&article, "AI demand"));
        assert!(utils::matches_query(&article, ""));
        assert!(!utils::matches_query(&article, "oil"));
    }

    #[test]
    fn test_is_ticker_like() {
        assert!(utils::is_ticker_like("AAPL"));
        assert!(utils::is_ticker_like("BRK.B"));
        assert!(!utils::is_ticker_like("apple"));
        assert!(!utils::is_ticker_like("interest rates"));
        assert!(!utils::is_ticker_like(""));
    }

    #[tokio::test]
    async fn test_context_respects_quota() {
        let transport = Arc::new(MockTransport::always(200, "{}"));
        let limits = HashMap::from([("vendor_a".to_string(), RateLimit::new(Some(1), None))]);
        let limiter = Arc::new(RateLimiter::new(limits));
        let config = SourceConfig::new("vendor_a", SourceType::VendorA);
        let ctx = context_with_limiter(config, transport.clone(), limiter);

        assert!(ctx.get("https://api.test", &[]).await.is_ok());
        assert!(matches!(ctx.get("https://api.test", &[]).await, Err(Error::RateLimited(_))));
        assert_eq!(transport.call_count(), 1);

        let headers = &transport.calls()[0].headers;
        assert!(headers.iter().any(|(k, _)| k == "User-Agent"));
    }

    #[test]
    fn test_build_adapters_follows_config() {
        let mut config = AppConfig::default();
        for source in &mut config.sources {
            source.enabled = true;
        }
        let transport = Arc::new(MockTransport::always(200, ""));
        let adapters = build_adapters(&config, transport, Arc::new(RateLimiter::default()));
        let kinds: Vec<_> = adapters.iter().map(|a| a.source_type()).collect();
        assert_eq!(
            kinds,
            vec![SourceType::Feed, SourceType::VendorA, SourceType::VendorB, SourceType::Events]
        );
    }
}
