use async_trait::async_trait;
use chrono::Utc;
use fnews_core::{Article, Result, SourceType};
use serde::Deserialize;
use tracing::info;

use super::utils::{domain_of, non_empty, parse_datetime, since_cutoff};
use super::{SourceAdapter, SourceContext};
use crate::keywords::keyword_set;

const DEFAULT_BASE_URL: &str = "https://api.gdeltproject.org";
const MAX_RECORDS: usize = 250;
const DEFAULT_QUERY: &str = "(economy OR markets OR stocks)";

#[derive(Debug, Deserialize)]
struct DocResponse {
    #[serde(default)]
    articles: Vec<DocArticle>,
}

#[derive(Debug, Deserialize)]
struct DocArticle {
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "seendate")]
    seen_date: Option<String>,
    domain: Option<String>,
    language: Option<String>,
    #[serde(rename = "sourcecountry")]
    source_country: Option<String>,
    #[serde(rename = "socialimage")]
    social_image: Option<String>,
}

/// Global events document search, one request per run.
pub struct EventsAdapter {
    ctx: SourceContext,
}

impl EventsAdapter {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    fn params(&self, query: &str, since_days: u32, max_records: usize) -> Vec<(String, String)> {
        let query = query.trim();
        let query = if query.is_empty() { DEFAULT_QUERY } else { query };
        vec![
            ("query".to_string(), query.to_string()),
            ("mode".to_string(), "ArtList".to_string()),
            ("format".to_string(), "json".to_string()),
            ("maxrecords".to_string(), max_records.to_string()),
            ("timespan".to_string(), format!("{}d", since_days.max(1))),
            ("sort".to_string(), "DateDesc".to_string()),
        ]
    }

    fn to_article(&self, record: DocArticle) -> Option<Article> {
        let title = non_empty(record.title)?;
        let url = non_empty(record.url)?;
        let published = record
            .seen_date
            .as_deref()
            .and_then(parse_datetime)
            .unwrap_or_else(Utc::now);
        let source = non_empty(record.domain)
            .or_else(|| domain_of(&url))
            .unwrap_or_else(|| self.ctx.name().to_string());

        let mut article = Article::new(title, url, published, source, SourceType::Events);
        article.image_url = non_empty(record.social_image);
        article.keywords = keyword_set(&article.title);
        if let Some(country) = non_empty(record.source_country) {
            article.categories.insert(country);
        }
        if let Some(language) = non_empty(record.language) {
            article.categories.insert(format!("lang:{}", language.to_lowercase()));
        }
        Some(article)
    }
}

#[async_trait]
impl SourceAdapter for EventsAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn source_type(&self) -> SourceType {
        SourceType::Events
    }

    async fn try_fetch(&self, query: &str, since_days: u32, limit: usize) -> Result<Vec<Article>> {
        let url = format!("{}/api/v2/doc/doc", self.ctx.base_url(DEFAULT_BASE_URL));
        let max_records = self.ctx.config.page_size.min(limit).clamp(1, MAX_RECORDS);
        info!("🦗 Searching {} for {:?}", self.ctx.name(), query);

        let response = self.ctx.get(&url, &self.params(query, since_days, max_records)).await?;
        // an empty result set comes back as an empty body
        if response.body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: DocResponse = self.ctx.parse_page(&response.body)?;

        let cutoff = since_cutoff(since_days.max(1));
        Ok(parsed
            .articles
            .into_iter()
            .filter_map(|r| self.to_article(r))
            .filter(|a| a.published_date >= cutoff)
            .collect())
    }
}
