use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnews_core::config::FeedConfig;
use fnews_core::{Article, Error, Result, SourceType};
use futures::future::join_all;
use tracing::info;

use super::utils::{matches_query, non_empty, parse_datetime, since_cutoff, strip_html};
use super::{SourceAdapter, SourceContext};
use crate::keywords::keyword_set;

/// Syndication feeds: RSS 2.0 first, Atom when that does not parse.
pub struct FeedAdapter {
    ctx: SourceContext,
}

impl FeedAdapter {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    async fn fetch_feed(&self, feed: &FeedConfig) -> Result<Vec<Article>> {
        let response = self.ctx.get(&feed.url, &[]).await?;
        let articles = parse_feed(&response.body, feed, Utc::now())?;
        self.ctx
            .logger
            .debug(&format!("{} yielded {} items", feed.name, articles.len()));
        Ok(articles)
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn source_type(&self) -> SourceType {
        SourceType::Feed
    }

    async fn try_fetch(&self, query: &str, since_days: u32, _limit: usize) -> Result<Vec<Article>> {
        let feeds = &self.ctx.config.feeds;
        info!("🦗 Reading {} feeds for {:?}", feeds.len(), query);

        let results = join_all(feeds.iter().map(|feed| self.fetch_feed(feed))).await;

        let cutoff = since_cutoff(since_days);
        let mut articles = Vec::new();
        let mut failures = 0;
        let mut last_error = None;
        for (feed, result) in feeds.iter().zip(results) {
            match result {
                Ok(items) => articles.extend(
                    items
                        .into_iter()
                        .filter(|a| a.published_date >= cutoff && matches_query(a, query)),
                ),
                Err(e) => {
                    self.ctx.logger.warn(&format!("feed {} failed: {}", feed.name, e));
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        // only a total outage is an error for this source
        if let Some(e) = last_error {
            if failures == feeds.len() {
                return Err(e);
            }
        }

        articles.sort_by(|a, b| b.published_date.cmp(&a.published_date));
        Ok(articles)
    }
}

/// Parses a feed body into articles attributed to `feed`. Items without a
/// parseable date are dated `crawled`.
pub(crate) fn parse_feed(body: &str, feed: &FeedConfig, crawled: DateTime<Utc>) -> Result<Vec<Article>> {
    if let Ok(channel) = rss::Channel::read_from(body.as_bytes()) {
        return Ok(parse_rss_channel(&channel, feed, crawled));
    }
    if let Ok(atom) = atom_syndication::Feed::read_from(body.as_bytes()) {
        return Ok(parse_atom_feed(&atom, feed, crawled));
    }
    Err(Error::MalformedResponse(format!("{} is neither RSS nor Atom", feed.url)))
}

fn parse_rss_channel(channel: &rss::Channel, feed: &FeedConfig, crawled: DateTime<Utc>) -> Vec<Article> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let title = non_empty(item.title().map(strip_html))?;
            let url = non_empty(item.link().map(str::to_string))?;
            let published = item.pub_date().and_then(parse_datetime).unwrap_or(crawled);

            let mut article = Article::new(title, url, published, &feed.name, SourceType::Feed);
            article.crawled_date = crawled;
            article.summary = non_empty(item.description().map(strip_html));
            article.content = non_empty(item.content().map(strip_html))
                .or_else(|| article.summary.clone())
                .unwrap_or_default();
            article.image_url = item
                .enclosure()
                .filter(|e| e.mime_type().starts_with("image/"))
                .map(|e| e.url().to_string());
            article
                .categories
                .extend(item.categories().iter().map(|c| c.name().trim().to_string()));
            Some(finish(article, feed))
        })
        .collect()
}

fn parse_atom_feed(atom: &atom_syndication::Feed, feed: &FeedConfig, crawled: DateTime<Utc>) -> Vec<Article> {
    atom.entries()
        .iter()
        .filter_map(|entry| {
            let title = non_empty(Some(strip_html(entry.title().as_str())))?;
            let url = non_empty(entry.links().first().map(|l| l.href().to_string()))?;
            let published = entry
                .published()
                .copied()
                .unwrap_or_else(|| *entry.updated())
                .with_timezone(&Utc);

            let mut article = Article::new(title, url, published, &feed.name, SourceType::Feed);
            article.crawled_date = crawled;
            article.summary = non_empty(entry.summary().map(|s| strip_html(s.as_str())));
            article.content = non_empty(entry.content().and_then(|c| c.value()).map(strip_html))
                .or_else(|| article.summary.clone())
                .unwrap_or_default();
            article
                .categories
                .extend(entry.categories().iter().map(|c| c.term().trim().to_string()));
            Some(finish(article, feed))
        })
        .collect()
}

fn finish(mut article: Article, feed: &FeedConfig) -> Article {
    article.categories.extend(feed.categories.iter().cloned());
    article.categories.retain(|c| !c.is_empty());
    let text = format!("{} {}", article.title, article.summary.as_deref().unwrap_or_default());
    article.keywords = keyword_set(&text);
    article
}
