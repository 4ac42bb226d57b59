use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::types::Article;
use crate::Result;

/// Filters for [`ArticleStorage::search`]. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    /// Case-insensitive substring over title, content and summary.
    pub text: Option<String>,
    pub source: Option<String>,
    pub symbol: Option<String>,
    pub published_from: Option<DateTime<Utc>>,
    pub published_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ArticleQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// In-process evaluation of the filters, shared by backends that cannot
    /// push them down.
    pub fn matches(&self, article: &Article) -> bool {
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let hit = article.title.to_lowercase().contains(&needle)
                || article.content.to_lowercase().contains(&needle)
                || article
                    .summary
                    .as_deref()
                    .map_or(false, |s| s.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if article.source != *source && !article.sources.iter().any(|s| s == source) {
                return false;
            }
        }
        if let Some(symbol) = &self.symbol {
            if !article.related_symbols.contains(symbol) {
                return false;
            }
        }
        if let Some(from) = self.published_from {
            if article.published_date < from {
                return false;
            }
        }
        if let Some(to) = self.published_to {
            if article.published_date > to {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert or replace keyed by `url`. Returns true when the url was new.
    async fn upsert_by_url(&self, article: &Article) -> Result<bool>;

    /// Text search with optional filters, newest first.
    async fn search(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>>;
}
