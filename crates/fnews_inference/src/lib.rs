pub mod models;

pub use models::create_model;
pub use models::http::HttpSentimentModel;
pub use models::lexicon::LexiconModel;

pub mod prelude {
    pub use super::models::create_model;
    pub use super::{HttpSentimentModel, LexiconModel};
    pub use fnews_core::{Error, Result, Sentiment, SentimentLabel, SentimentModel};
}
