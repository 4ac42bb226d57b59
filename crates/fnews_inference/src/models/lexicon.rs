use async_trait::async_trait;
use fnews_core::{Result, Sentiment, SentimentLabel, SentimentModel};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

const POSITIVE: &[&str] = &[
    "beat", "beats", "boost", "boosts", "bullish", "climb", "climbs", "gain", "gains", "growth",
    "high", "higher", "jump", "jumps", "outperform", "profit", "profits", "rally", "rallies",
    "rebound", "record", "rise", "rises", "soar", "soars", "strong", "surge", "surges", "upgrade",
    "upgraded", "win", "wins",
];

const NEGATIVE: &[&str] = &[
    "bankruptcy", "bearish", "crash", "crashes", "cut", "cuts", "decline", "declines", "default",
    "downgrade", "downgraded", "drop", "drops", "fall", "falls", "fear", "fears", "fraud", "layoffs",
    "lawsuit", "loss", "losses", "lower", "miss", "misses", "plunge", "plunges", "recession",
    "selloff", "slump", "slumps", "tumble", "tumbles", "weak",
];

const NEGATIONS: &[&str] = &["no", "not", "never", "without"];

/// Weight given to neutral before any word is counted, so a single hit
/// carries the label while a text with no hits reads as neutral.
const NEUTRAL_PRIOR: f32 = 0.5;

/// Offline finance word-list model. Deterministic and needs no network.
pub struct LexiconModel {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

impl fmt::Debug for LexiconModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconModel")
            .field("positive", &self.positive.len())
            .field("negative", &self.negative.len())
            .finish()
    }
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconModel {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE.iter().copied().collect(),
            negative: NEGATIVE.iter().copied().collect(),
        }
    }

    pub fn score(&self, text: &str) -> Option<Sentiment> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut positive = 0.0;
        let mut negative = 0.0;
        for (i, word) in words.iter().enumerate() {
            let negated = i > 0 && NEGATIONS.contains(&words[i - 1].as_str());
            let (pos, neg) = (self.positive.contains(word.as_str()), self.negative.contains(word.as_str()));
            match (pos, neg, negated) {
                (true, _, false) | (_, true, true) => positive += 1.0,
                (true, _, true) | (_, true, false) => negative += 1.0,
                _ => {}
            }
        }

        let mut weights = BTreeMap::new();
        weights.insert(SentimentLabel::Positive, positive);
        weights.insert(SentimentLabel::Neutral, NEUTRAL_PRIOR);
        weights.insert(SentimentLabel::Negative, negative);
        Sentiment::from_distribution(weights)
    }
}

#[async_trait]
impl SentimentModel for LexiconModel {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn analyze_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>> {
        Ok(texts.iter().map(|t| self.score(t)).collect())
    }
}
