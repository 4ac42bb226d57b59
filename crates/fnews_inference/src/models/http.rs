use async_trait::async_trait;
use fnews_core::{Error, Result, Sentiment, SentimentLabel, SentimentModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ScoreRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct ScoreResponse {
    results: Vec<Option<ScoreResult>>,
}

#[derive(Deserialize)]
struct ScoreResult {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    distribution: Option<HashMap<String, f32>>,
}

impl ScoreResult {
    /// A distribution wins over a bare label; unknown label spellings are dropped.
    fn into_sentiment(self) -> Option<Sentiment> {
        if let Some(distribution) = self.distribution {
            let mut weights = BTreeMap::new();
            for (label, weight) in distribution {
                if let Some(label) = SentimentLabel::parse_loose(&label) {
                    *weights.entry(label).or_insert(0.0) += weight;
                }
            }
            return Sentiment::from_distribution(weights);
        }
        self.label
            .as_deref()
            .and_then(SentimentLabel::parse_loose)
            .map(Sentiment::from_label)
    }
}

/// Scores batches against a remote service: `POST {endpoint}` with
/// `{"texts": [...]}`, answered by `{"results": [{label, distribution} | null]}`.
pub struct HttpSentimentModel {
    client: Arc<Client>,
    endpoint: String,
    api_key: Option<String>,
}

impl fmt::Debug for HttpSentimentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSentimentModel")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpSentimentModel {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        url::Url::parse(endpoint).map_err(|e| Error::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client: Arc::new(client),
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    fn parse_response(body: &str, expected: usize) -> Result<Vec<Option<Sentiment>>> {
        let response: ScoreResponse = serde_json::from_str(body)
            .map_err(|e| Error::Inference(format!("Invalid scoring response: {}", e)))?;
        if response.results.len() != expected {
            return Err(Error::Inference(format!(
                "Scoring service returned {} results for {} texts",
                response.results.len(),
                expected
            )));
        }
        Ok(response
            .results
            .into_iter()
            .map(|r| r.and_then(ScoreResult::into_sentiment))
            .collect())
    }
}

#[async_trait]
impl SentimentModel for HttpSentimentModel {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&ScoreRequest { texts });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Inference(format!("Scoring service returned {}", status)));
        }
        let body = response.text().await?;
        debug!("🧠 Scored {} texts", texts.len());
        Self::parse_response(&body, texts.len())
    }
}
