use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which adapter produced an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Feed,
    VendorA,
    VendorB,
    Events,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Feed => "feed",
            SourceType::VendorA => "vendor_a",
            SourceType::VendorB => "vendor_b",
            SourceType::Events => "events",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "feed" => Ok(SourceType::Feed),
            "vendor_a" => Ok(SourceType::VendorA),
            "vendor_b" => Ok(SourceType::VendorB),
            "events" => Ok(SourceType::Events),
            other => Err(crate::Error::Config(format!("Unknown source type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Accepts the spellings upstreams and scoring services use
    /// ("positive", "Bullish", "somewhat-bearish", ...).
    pub fn parse_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if s.contains("positive") || s.contains("bullish") {
            Some(SentimentLabel::Positive)
        } else if s.contains("negative") || s.contains("bearish") {
            Some(SentimentLabel::Negative)
        } else if s.contains("neutral") {
            Some(SentimentLabel::Neutral)
        } else {
            None
        }
    }
}

/// A complete sentiment distribution. Construct through
/// [`Sentiment::from_distribution`] so `label` always matches the argmax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f32,
    pub distribution: BTreeMap<SentimentLabel, f32>,
}

impl Sentiment {
    /// Normalizes the weights, fills absent labels with zero and picks the
    /// argmax as the label. Ties go to the earlier label in
    /// [`SentimentLabel::ALL`]. Returns `None` when there is no positive mass.
    pub fn from_distribution(weights: BTreeMap<SentimentLabel, f32>) -> Option<Self> {
        let total: f32 = weights.values().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }

        let mut distribution = BTreeMap::new();
        for label in SentimentLabel::ALL {
            let w = weights.get(&label).copied().unwrap_or(0.0);
            let w = if w.is_finite() && w > 0.0 { w / total } else { 0.0 };
            distribution.insert(label, w);
        }

        let mut best = SentimentLabel::ALL[0];
        for label in SentimentLabel::ALL {
            if distribution[&label] > distribution[&best] {
                best = label;
            }
        }

        Some(Self {
            label: best,
            score: distribution[&best],
            distribution,
        })
    }

    /// One-hot distribution for upstreams that only report a label.
    pub fn from_label(label: SentimentLabel) -> Self {
        let distribution = SentimentLabel::ALL
            .iter()
            .map(|l| (*l, if *l == label { 1.0 } else { 0.0 }))
            .collect();
        Self {
            label,
            score: 1.0,
            distribution,
        }
    }

    pub fn is_consistent(&self) -> bool {
        if SentimentLabel::ALL.iter().any(|l| !self.distribution.contains_key(l)) {
            return false;
        }
        let max = self.distribution.values().cloned().fold(f32::MIN, f32::max);
        (self.distribution[&self.label] - max).abs() < f32::EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub url: String,
    pub published_date: DateTime<Utc>,
    pub crawled_date: DateTime<Utc>,
    pub source: String,
    pub source_type: SourceType,
    /// Every outlet that contributed to this logical article, in discovery order.
    pub sources: Vec<String>,
    pub keywords: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub related_symbols: BTreeSet<String>,
    pub sentiment: Option<Sentiment>,
    pub image_url: Option<String>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        published_date: DateTime<Utc>,
        source: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        let source = source.into();
        Self {
            title: title.into(),
            content: String::new(),
            summary: None,
            url: url.into(),
            published_date,
            crawled_date: Utc::now(),
            sources: vec![source.clone()],
            source,
            source_type,
            keywords: BTreeSet::new(),
            categories: BTreeSet::new(),
            related_symbols: BTreeSet::new(),
            sentiment: None,
            image_url: None,
        }
    }

    /// Both identity fields are present.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    /// Appends to `sources` unless already present.
    pub fn add_source(&mut self, source: &str) {
        if !source.is_empty() && !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    /// Absorbs a duplicate: unions provenance and tag sets, keeps the
    /// existing sentiment when there is one.
    pub fn absorb(&mut self, other: Article) {
        self.add_source(&other.source);
        for source in &other.sources {
            self.add_source(source);
        }
        self.keywords.extend(other.keywords);
        self.categories.extend(other.categories);
        self.related_symbols.extend(other.related_symbols);

        if self.sentiment.is_none() {
            self.sentiment = other.sentiment;
        }
        if self.summary.is_none() {
            self.summary = other.summary;
        }
        if self.image_url.is_none() {
            self.image_url = other.image_url;
        }
        if self.content.is_empty() {
            self.content = other.content;
        }
    }

    /// Text handed to the sentiment model, cut to `max_chars` characters.
    pub fn sentiment_text(&self, max_chars: usize) -> String {
        let body = match &self.summary {
            Some(summary) if !summary.is_empty() => summary.as_str(),
            _ => self.content.as_str(),
        };
        let text = if body.is_empty() {
            self.title.clone()
        } else {
            format!("{}. {}", self.title, body)
        };
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, source: &str) -> Article {
        Article::new("Fed holds rates", url, Utc::now(), source, SourceType::Feed)
    }

    #[test]
    fn test_sentiment_label_is_argmax() {
        let weights = BTreeMap::from([
            (SentimentLabel::Positive, 2.0),
            (SentimentLabel::Negative, 6.0),
            (SentimentLabel::Neutral, 2.0),
        ]);
        let sentiment = Sentiment::from_distribution(weights).unwrap();
        assert_eq!(sentiment.label, SentimentLabel::Negative);
        assert!((sentiment.score - 0.6).abs() < 1e-6);
        assert!(sentiment.is_consistent());
        assert_eq!(sentiment.distribution.len(), 3);
    }

    #[test]
    fn test_sentiment_empty_mass() {
        assert!(Sentiment::from_distribution(BTreeMap::new()).is_none());
        let zeros = BTreeMap::from([(SentimentLabel::Neutral, 0.0)]);
        assert!(Sentiment::from_distribution(zeros).is_none());
    }

    #[test]
    fn test_from_label_one_hot() {
        let sentiment = Sentiment::from_label(SentimentLabel::Positive);
        assert_eq!(sentiment.label, SentimentLabel::Positive);
        assert_eq!(sentiment.score, 1.0);
        assert_eq!(sentiment.distribution[&SentimentLabel::Negative], 0.0);
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(SentimentLabel::parse_loose("Somewhat-Bullish"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::parse_loose("negative"), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::parse_loose("Neutral"), Some(SentimentLabel::Neutral));
        assert_eq!(SentimentLabel::parse_loose("mixed"), None);
    }

    #[test]
    fn test_is_valid() {
        assert!(article("https://x.com/a", "A").is_valid());
        assert!(!article("", "A").is_valid());
        let mut untitled = article("https://x.com/a", "A");
        untitled.title = "   ".to_string();
        assert!(!untitled.is_valid());
    }

    #[test]
    fn test_absorb_unions_and_keeps_first_sentiment() {
        let mut first = article("https://x.com/a", "A");
        first.keywords.insert("rates".into());
        first.sentiment = Some(Sentiment::from_label(SentimentLabel::Neutral));

        let mut second = article("https://x.com/a", "B");
        second.keywords.insert("inflation".into());
        second.related_symbols.insert("SPY".into());
        second.sentiment = Some(Sentiment::from_label(SentimentLabel::Negative));
        second.image_url = Some("https://x.com/a.png".into());

        first.absorb(second);
        assert_eq!(first.sources, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(first.keywords.len(), 2);
        assert!(first.related_symbols.contains("SPY"));
        assert_eq!(first.sentiment.unwrap().label, SentimentLabel::Neutral);
        assert_eq!(first.image_url.as_deref(), Some("https://x.com/a.png"));
    }

    #[test]
    fn test_sentiment_text_truncates_on_chars() {
        let mut a = article("https://x.com/a", "A");
        a.summary = Some("é".repeat(2000));
        let text = a.sentiment_text(1024);
        assert_eq!(text.chars().count(), 1024);
        assert!(text.starts_with("Fed holds rates. "));
    }
}
