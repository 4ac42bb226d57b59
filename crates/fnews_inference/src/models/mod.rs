use fnews_core::config::SentimentConfig;
use fnews_core::{Error, Result, SentimentModel};
use std::sync::Arc;
use tracing::info;

pub mod http;
pub mod lexicon;

use http::HttpSentimentModel;
use lexicon::LexiconModel;

/// Builds the model named by `config.model`.
pub fn create_model(config: &SentimentConfig) -> Result<Arc<dyn SentimentModel>> {
    match config.model.as_str() {
        "lexicon" => {
            info!("🧠 Using lexicon sentiment model");
            Ok(Arc::new(LexiconModel::new()))
        }
        "http" => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| Error::Config("sentiment.endpoint is required for the http model".to_string()))?;
            let model = HttpSentimentModel::new(endpoint, config.api_key.clone())?;
            info!("🧠 Using sentiment service at {}", endpoint);
            Ok(Arc::new(model))
        }
        other => Err(Error::Config(format!("Unknown sentiment model: {}", other))),
    }
}
