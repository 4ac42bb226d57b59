use async_trait::async_trait;
use fnews_core::{Article, ArticleQuery, ArticleStorage, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store keyed by url. Contents are lost on exit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    articles: Arc<RwLock<HashMap<String, Article>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.articles.read().await.is_empty()
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn upsert_by_url(&self, article: &Article) -> Result<bool> {
        let mut articles = self.articles.write().await;
        let previous = articles.insert(article.url.clone(), article.clone());
        Ok(previous.is_none())
    }

    async fn search(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let articles = self.articles.read().await;
        let mut found: Vec<Article> = articles.values().filter(|a| query.matches(a)).cloned().collect();
        found.sort_by(|a, b| b.published_date.cmp(&a.published_date).then_with(|| a.url.cmp(&b.url)));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        Ok(self.articles.read().await.get(url).cloned())
    }
}
