use async_trait::async_trait;
use chrono::Utc;
use fnews_core::{Article, Result, SourceType};
use serde::Deserialize;
use tracing::info;

use super::utils::{domain_of, is_ticker_like, non_empty, parse_datetime, since_cutoff};
use super::{SourceAdapter, SourceContext};
use crate::keywords::keyword_set;

const DEFAULT_BASE_URL: &str = "https://api.marketaux.com";

#[derive(Debug, Deserialize)]
struct NewsPage {
    meta: Option<Meta>,
    #[serde(default)]
    data: Vec<NewsRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    found: usize,
    #[serde(default)]
    returned: usize,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    page: usize,
}

#[derive(Debug, Deserialize)]
struct NewsRecord {
    #[allow(dead_code)]
    uuid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    snippet: Option<String>,
    url: Option<String>,
    image_url: Option<String>,
    published_at: Option<String>,
    source: Option<String>,
    keywords: Option<String>,
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    symbol: Option<String>,
    industry: Option<String>,
}

/// Entity news API with page-number pagination driven by `meta`.
pub struct VendorBAdapter {
    ctx: SourceContext,
}

impl VendorBAdapter {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    fn params(&self, query: &str, since_days: u32, page_size: usize, page: usize, key: &str) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let query = query.trim();
        if is_ticker_like(query) {
            params.push(("symbols".to_string(), query.to_string()));
        } else if !query.is_empty() {
            params.push(("search".to_string(), query.to_string()));
        }
        params.push((
            "published_after".to_string(),
            since_cutoff(since_days).format("%Y-%m-%dT%H:%M:%S").to_string(),
        ));
        params.push(("language".to_string(), "en".to_string()));
        params.push(("limit".to_string(), page_size.to_string()));
        params.push(("page".to_string(), page.to_string()));
        params.push(("api_token".to_string(), key.to_string()));
        params
    }

    fn to_article(&self, record: NewsRecord) -> Option<Article> {
        let title = non_empty(record.title)?;
        let url = non_empty(record.url)?;
        let published = record
            .published_at
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or_else(Utc::now);
        let source = non_empty(record.source)
            .or_else(|| domain_of(&url))
            .unwrap_or_else(|| self.ctx.name().to_string());

        let description = non_empty(record.description);
        let snippet = non_empty(record.snippet);

        let mut article = Article::new(title, url, published, source, SourceType::VendorB);
        article.content = snippet.clone().or_else(|| description.clone()).unwrap_or_default();
        article.summary = description.or(snippet);
        article.image_url = non_empty(record.image_url);
        article.keywords = record
            .keywords
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if article.keywords.is_empty() {
            let text = format!("{} {}", article.title, article.summary.as_deref().unwrap_or_default());
            article.keywords = keyword_set(&text);
        }
        for entity in record.entities {
            if let Some(symbol) = non_empty(entity.symbol) {
                article.related_symbols.insert(symbol);
            }
            if let Some(industry) = non_empty(entity.industry) {
                article.categories.insert(industry);
            }
        }
        Some(article)
    }
}

#[async_trait]
impl SourceAdapter for VendorBAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn source_type(&self) -> SourceType {
        SourceType::VendorB
    }

    async fn try_fetch(&self, query: &str, since_days: u32, limit: usize) -> Result<Vec<Article>> {
        let key = self.ctx.api_key()?;
        let page_size = self.ctx.config.page_size.min(limit).max(1);
        let url = format!("{}/v1/news/all", self.ctx.base_url(DEFAULT_BASE_URL));
        info!("🦗 Querying {} for {:?}", self.ctx.name(), query);

        let mut articles = Vec::new();
        for page in 0..self.ctx.config.max_pages {
            let params = self.params(query, since_days, page_size, page + 1, key);
            let body = match self.ctx.get(&url, &params).await {
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

            let meta = parsed.meta.unwrap_or_default();
            let returned = if meta.returned > 0 { meta.returned } else { parsed.data.len() };
            let served_limit = if meta.limit > 0 { meta.limit } else { page_size };
            let served_page = if meta.page > 0 { meta.page } else { page + 1 };
            articles.extend(parsed.data.into_iter().filter_map(|r| self.to_article(r)));

            let more = returned > 0 && served_page * served_limit < meta.found;
            if !more || articles.len() >= limit {
                break;
            }
        }

        Ok(articles)
    }
}
