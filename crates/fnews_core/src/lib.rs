pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod types;

pub use error::Error;
pub use models::SentimentModel;
pub use storage::{ArticleQuery, ArticleStorage};
pub use types::{Article, Sentiment, SentimentLabel, SourceType};

pub type Result<T> = std::result::Result<T, Error>;
