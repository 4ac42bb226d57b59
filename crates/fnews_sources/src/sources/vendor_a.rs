use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use fnews_core::{Article, Result, Sentiment, SentimentLabel, SourceType};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use super::utils::{domain_of, is_ticker_like, non_empty, parse_datetime, since_cutoff};
use super::{SourceAdapter, SourceContext};
use crate::keywords::keyword_set;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

#[derive(Debug, Deserialize)]
struct NewsPage {
    #[serde(default)]
    results: Vec<NewsRecord>,
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsRecord {
    title: Option<String>,
    article_url: Option<String>,
    published_utc: Option<String>,
    description: Option<String>,
    publisher: Option<Publisher>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    image_url: Option<String>,
    #[serde(default)]
    insights: Vec<Insight>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Insight {
    #[allow(dead_code)]
    ticker: Option<String>,
    sentiment: Option<String>,
}

/// Ticker news API with cursor pagination through `next_url`.
pub struct VendorAAdapter {
    ctx: SourceContext,
}

impl VendorAAdapter {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    fn first_page(&self, query: &str, since_days: u32, page_size: usize, key: &str) -> (String, Vec<(String, String)>) {
        let url = format!("{}/v2/reference/news", self.ctx.base_url(DEFAULT_BASE_URL));
        let mut params = Vec::new();
        let query = query.trim();
        if is_ticker_like(query) {
            params.push(("ticker".to_string(), query.to_string()));
        } else if !query.is_empty() {
            params.push(("search".to_string(), query.to_string()));
        }
        params.push((
            "published_utc.gte".to_string(),
            since_cutoff(since_days).to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        params.push(("limit".to_string(), page_size.to_string()));
        params.push(("order".to_string(), "desc".to_string()));
        params.push(("apiKey".to_string(), key.to_string()));
        (url, params)
    }

    fn to_article(&self, record: NewsRecord) -> Option<Article> {
        let title = non_empty(record.title)?;
        let url = non_empty(record.article_url)?;
        let published = record
            .published_utc
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or_else(Utc::now);
        let source = record
            .publisher
            .and_then(|p| non_empty(p.name))
            .or_else(|| domain_of(&url))
            .unwrap_or_else(|| self.ctx.name().to_string());

        let mut article = Article::new(title, url, published, source, SourceType::VendorA);
        article.summary = non_empty(record.description);
        article.content = article.summary.clone().unwrap_or_default();
        article.image_url = non_empty(record.image_url);
        article.related_symbols = record.tickers.into_iter().filter(|t| !t.is_empty()).collect();
        article.keywords = record
            .keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if article.keywords.is_empty() {
            article.keywords = keyword_set(&format!("{} {}", article.title, article.content));
        }
        article.sentiment = insight_sentiment(&record.insights);
        Some(article)
    }
}

/// Per-ticker insight labels folded into one distribution of label fractions.
fn insight_sentiment(insights: &[Insight]) -> Option<Sentiment> {
    let mut counts: BTreeMap<SentimentLabel, f32> = BTreeMap::new();
    for label in insights
        .iter()
        .filter_map(|i| i.sentiment.as_deref())
        .filter_map(SentimentLabel::parse_loose)
    {
        *counts.entry(label).or_insert(0.0) += 1.0;
    }
    Sentiment::from_distribution(counts)
}

#[async_trait]
impl SourceAdapter for VendorAAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn source_type(&self) -> SourceType {
        SourceType::VendorA
    }

    async fn try_fetch(&self, query: &str, since_days: u32, limit: usize) -> Result<Vec<Article>> {
        let key = self.ctx.api_key()?;
        let page_size = self.ctx.config.page_size.min(limit).max(1);
        info!("🦗 Querying {} for {:?}", self.ctx.name(), query);

        let mut articles = Vec::new();
        let mut request = self.first_page(query, since_days, page_size, key);

        for page in 0..self.ctx.config.max_pages {
            let body = match self.ctx.get(&request.0, &request.1).await {
                Ok(response) => response.body,
                Err(e) => {
                    self.ctx.contain_page_error(page, e)?;
                    break;
                }
            };
            let parsed: NewsPage = match self.ctx.parse_page(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.ctx.contain_page_error(page, e)?;
                    break;
                }
            };

            let returned = parsed.results.len();
            articles.extend(parsed.results.into_iter().filter_map(|r| self.to_article(r)));

            match parsed.next_url {
                Some(next) if returned > 0 && articles.len() < limit => {
                    // the cursor url comes back without credentials
                    request = (next, vec![("apiKey".to_string(), key.to_string())]);
                }
                _ => break,
            }
        }

        Ok(articles)
    }
}
