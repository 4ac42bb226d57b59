//! Collapses a batch of canonical articles into logical articles.
//!
//! Identity is decided in one pass over the batch sorted newest first. A url
//! seen before always merges into the article that owns it. Otherwise the
//! lower-cased title is scored against every open article's title and the
//! first one that is similar enough and published within the time window
//! absorbs it. Anything left opens a new logical article.
//!
//! Every url that was absorbed is indexed as well, so a later record carrying
//! it lands on the same logical article. That keeps output urls unique and
//! makes a second pass over the output a no-op.

use chrono::Duration;
use fnews_core::config::{DedupConfig, SimilarityMetric};
use fnews_core::Article;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_TITLE_SIMILARITY: u8 = 90;
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 300;
const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Similarity of two titles in 0..=100.
pub fn title_similarity(metric: SimilarityMetric, a: &str, b: &str) -> u8 {
    let score = match metric {
        SimilarityMetric::Ratio => strsim::normalized_levenshtein(a, b),
        SimilarityMetric::TokenSort => {
            strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b))
        }
        SimilarityMetric::JaroWinkler => strsim::jaro_winkler(a, b),
    };
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    threshold: u8,
    window: Duration,
    metric: SimilarityMetric,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_SIMILARITY, DEFAULT_TIME_WINDOW_SECS, SimilarityMetric::default())
    }
}

impl From<&DedupConfig> for Deduplicator {
    fn from(config: &DedupConfig) -> Self {
        Self::new(config.title_similarity, config.time_window_secs, config.metric)
    }
}

impl Deduplicator {
    pub fn new(threshold: u8, time_window_secs: u64, metric: SimilarityMetric) -> Self {
        Self {
            threshold: threshold.min(100),
            window: Duration::seconds(time_window_secs.min(MAX_WINDOW_SECS) as i64),
            metric,
        }
    }

    pub fn merge(&self, mut articles: Vec<Article>) -> Vec<Article> {
        // stable, so equal timestamps keep their input order
        articles.sort_by(|a, b| b.published_date.cmp(&a.published_date));

        let incoming = articles.len();
        let mut merged: Vec<Article> = Vec::with_capacity(incoming);
        let mut by_url: HashMap<String, usize> = HashMap::new();
        let mut titles: Vec<(String, usize)> = Vec::new();

        for mut article in articles {
            if let Some(&idx) = by_url.get(&article.url) {
                merged[idx].absorb(article);
                continue;
            }

            let title = normalize_title(&article.title);
            let candidate = titles.iter().find(|(existing, idx)| {
                let (a, b) = (merged[*idx].published_date, article.published_date);
                let delta = if a > b { a - b } else { b - a };
                delta <= self.window && title_similarity(self.metric, existing, &title) >= self.threshold
            });

            if let Some(&(_, idx)) = candidate {
                debug!("🧬 \"{}\" merged into \"{}\"", article.title, merged[idx].title);
                by_url.insert(article.url.clone(), idx);
                merged[idx].absorb(article);
                continue;
            }

            let idx = merged.len();
            let source = article.source.clone();
            article.add_source(&source);
            by_url.insert(article.url.clone(), idx);
            titles.push((title, idx));
            merged.push(article);
        }

        debug!("🧬 {} articles collapsed into {}", incoming, merged.len());
        merged
    }
}

/// [`Deduplicator::merge`] with the default metric.
pub fn merge(articles: Vec<Article>, title_similarity_threshold: u8, time_window_secs: u64) -> Vec<Article> {
    Deduplicator::new(title_similarity_threshold, time_window_secs, SimilarityMetric::default()).merge(articles)
}
