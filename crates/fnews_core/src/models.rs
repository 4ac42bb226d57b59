use async_trait::async_trait;
use crate::types::Sentiment;
use crate::Result;

#[async_trait]
pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;

    /// Scores each text. The result has one entry per input; `None` marks an
    /// item the model could not analyze. An `Err` fails the whole batch.
    async fn analyze_batch(&self, texts: &[String]) -> Result<Vec<Option<Sentiment>>>;
}
