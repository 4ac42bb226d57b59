use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fnews_core::{Article, ArticleQuery, ArticleStorage, Error, Result, Sentiment, SourceType};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        summary TEXT,
        source TEXT NOT NULL,
        source_type TEXT NOT NULL,
        sources TEXT NOT NULL,
        keywords TEXT NOT NULL,
        categories TEXT NOT NULL,
        related_symbols TEXT NOT NULL,
        sentiment TEXT,
        image_url TEXT,
        published_date TEXT NOT NULL,
        crawled_date TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles (published_date)",
];

fn storage_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

/// Fixed-width UTC timestamps, so text order is time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// LIKE pattern for a text filter. SQLite folds only ASCII case, so other
/// needles are left to `ArticleQuery::matches`.
fn like_pattern(text: &str) -> Option<String> {
    if !text.is_ascii() {
        return None;
    }
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

impl SqliteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to open database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| storage_error(&format!("Failed to run migration {}", i), e))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| storage_error(&format!("Missing column {}", column), e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn date_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| storage_error(&format!("Missing column {}", column), e))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_error(&format!("Bad date in {}", column), e))
}

fn text_column(row: &SqliteRow, column: &str) -> Result<String> {
    row.try_get(column)
        .map_err(|e| storage_error(&format!("Missing column {}", column), e))
}

fn optional_text_column(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    row.try_get(column)
        .map_err(|e| storage_error(&format!("Missing column {}", column), e))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let sentiment: Option<Sentiment> = match optional_text_column(row, "sentiment")? {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    Ok(Article {
        title: text_column(row, "title")?,
        content: text_column(row, "content")?,
        summary: optional_text_column(row, "summary")?,
        url: text_column(row, "url")?,
        published_date: date_column(row, "published_date")?,
        crawled_date: date_column(row, "crawled_date")?,
        source: text_column(row, "source")?,
        source_type: text_column(row, "source_type")?.parse::<SourceType>()?,
        sources: json_column(row, "sources")?,
        keywords: json_column(row, "keywords")?,
        categories: json_column(row, "categories")?,
        related_symbols: json_column(row, "related_symbols")?,
        sentiment,
        image_url: optional_text_column(row, "image_url")?,
    })
}

#[async_trait]
impl ArticleStorage for SqliteStorage {
    async fn upsert_by_url(&self, article: &Article) -> Result<bool> {
        let existing = sqlx::query("SELECT 1 FROM articles WHERE url = ?")
            .bind(&article.url)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| storage_error("Failed to look up article", e))?;

        let sentiment = article
            .sentiment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO articles
            (url, title, content, summary, source, source_type, sources, keywords,
             categories, related_symbols, sentiment, image_url, published_date, crawled_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                summary = excluded.summary,
                source = excluded.source,
                source_type = excluded.source_type,
                sources = excluded.sources,
                keywords = excluded.keywords,
                categories = excluded.categories,
                related_symbols = excluded.related_symbols,
                sentiment = excluded.sentiment,
                image_url = excluded.image_url,
                published_date = excluded.published_date,
                crawled_date = excluded.crawled_date
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.summary.as_deref())
        .bind(&article.source)
        .bind(article.source_type.as_str())
        .bind(serde_json::to_string(&article.sources)?)
        .bind(serde_json::to_string(&article.keywords)?)
        .bind(serde_json::to_string(&article.categories)?)
        .bind(serde_json::to_string(&article.related_symbols)?)
        .bind(sentiment)
        .bind(article.image_url.as_deref())
        .bind(timestamp(&article.published_date))
        .bind(timestamp(&article.crawled_date))
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to store article", e))?;

        Ok(existing.is_none())
    }

    async fn search(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        // ASCII text and date filters run in SQL; `matches` re-checks every row
        let pattern = query.text.as_deref().and_then(like_pattern);
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE (?1 IS NULL
                   OR LOWER(title) LIKE ?1 ESCAPE '\'
                   OR LOWER(content) LIKE ?1 ESCAPE '\'
                   OR LOWER(COALESCE(summary, '')) LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR published_date >= ?2)
              AND (?3 IS NULL OR published_date <= ?3)
            ORDER BY published_date DESC, url ASC
            "#,
        )
        .bind(pattern)
        .bind(query.published_from.as_ref().map(timestamp))
        .bind(query.published_to.as_ref().map(timestamp))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to search articles", e))?;

        let mut articles = Vec::new();
        for row in &rows {
            let article = row_to_article(row)?;
            if query.matches(&article) {
                articles.push(article);
                if query.limit.map_or(false, |limit| articles.len() >= limit) {
                    break;
                }
            }
        }
        Ok(articles)
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| storage_error("Failed to get article", e))?;
        row.as_ref().map(row_to_article).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use fnews_core::SentimentLabel;
    use tempfile::tempdir;

    fn article(title: &str, url: &str, hours_ago: i64) -> Article {
        let published = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap() - Duration::hours(hours_ago);
        Article::new(title, url, published, "Reuters", SourceType::VendorB)
    }

    #[tokio::test]
    async fn test_sqlite_round_trips_articles() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let storage = SqliteStorage::new_with_path(&db_path).await.unwrap();
        assert_eq!(storage.get_db_path(), db_path.as_path());

        let mut a = article("Apple earnings beat", "https://x.test/apple", 1);
        a.summary = Some("Revenue topped estimates".to_string());
        a.related_symbols.insert("AAPL".to_string());
        a.keywords.insert("earnings".to_string());
        a.sentiment = Some(Sentiment::from_label(SentimentLabel::Positive));
        assert!(storage.upsert_by_url(&a).await.unwrap());

        a.add_source("CNBC");
        assert!(!storage.upsert_by_url(&a).await.unwrap());

        let stored = storage.get_by_url("https://x.test/apple").await.unwrap().unwrap();
        assert_eq!(stored, a);
        assert!(storage.get_by_url("https://x.test/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_search() {
        let temp_dir = tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();

        let mut apple = article("Apple earnings beat", "https://x.test/apple", 1);
        apple.related_symbols.insert("AAPL".to_string());
        let mut fed = article("Fed holds rates", "https://x.test/fed", 5);
        fed.summary = Some("Powell eyes earnings season".to_string());
        let mut oil = article("Oil slips", "https://x.test/oil", 2);
        oil.add_source("Bloomberg");
        for a in [&apple, &fed, &oil] {
            storage.upsert_by_url(a).await.unwrap();
        }

        let hits = storage.search(&ArticleQuery::text("Earnings")).await.unwrap();
        let urls: Vec<_> = hits.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.test/apple", "https://x.test/fed"]);

        let by_source = ArticleQuery {
            source: Some("Bloomberg".to_string()),
            ..ArticleQuery::default()
        };
        assert_eq!(storage.search(&by_source).await.unwrap()[0].url, "https://x.test/oil");

        let window = ArticleQuery {
            published_from: Some(Utc.with_ymd_and_hms(2024, 3, 20, 9, 0, 0).unwrap()),
            published_to: Some(Utc.with_ymd_and_hms(2024, 3, 20, 10, 30, 0).unwrap()),
            ..ArticleQuery::default()
        };
        let in_window = storage.search(&window).await.unwrap();
        assert_eq!(in_window.len(), 1);
        assert_eq!(in_window[0].url, "https://x.test/oil");

        let limited = ArticleQuery {
            limit: Some(2),
            ..ArticleQuery::default()
        };
        assert_eq!(storage.search(&limited).await.unwrap().len(), 2);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Rate_Cut 50%").as_deref(), Some(r"%rate\_cut 50\%%"));
        assert_eq!(like_pattern(r"a\b").as_deref(), Some(r"%a\\b%"));
        assert_eq!(like_pattern("ZÜRICH"), None);
    }

    #[tokio::test]
    async fn test_sqlite_search_agrees_with_memory() {
        let temp_dir = tempdir().unwrap();
        let sqlite = SqliteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();
        let memory = crate::InMemoryStorage::new();

        let zurich = article("Zürich bourse reacts", "https://x.test/zurich", 1);
        let pct = article("Stocks up 5% on the day", "https://x.test/pct", 2);
        let plain = article("Stocks up 5 points", "https://x.test/plain", 3);
        let under = article("Fed rate_path unchanged", "https://x.test/under", 4);
        let rates = article("Fed ratexpath unchanged", "https://x.test/rates", 5);
        for a in [&zurich, &pct, &plain, &under, &rates] {
            sqlite.upsert_by_url(a).await.unwrap();
            memory.upsert_by_url(a).await.unwrap();
        }

        for needle in ["ZÜRICH", "5%", "rate_path"] {
            let query = ArticleQuery::text(needle);
            let from_sqlite: Vec<_> = sqlite.search(&query).await.unwrap().into_iter().map(|a| a.url).collect();
            let from_memory: Vec<_> = memory.search(&query).await.unwrap().into_iter().map(|a| a.url).collect();
            assert_eq!(from_sqlite.len(), 1, "{}", needle);
            assert_eq!(from_sqlite, from_memory, "{}", needle);
        }
    }
}
