use fnews_core::config::StorageConfig;
use fnews_core::{ArticleStorage, Error, Result};
use std::sync::Arc;
use tracing::info;

pub mod backends;

pub use backends::*;

pub const DEFAULT_SQLITE_PATH: &str = "articles.db";

/// Opens the backend named by `config.backend`.
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ArticleStorage>> {
    match config.backend.as_str() {
        "memory" => {
            info!("💾 Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| std::path::PathBuf::from(DEFAULT_SQLITE_PATH));
            info!("💾 Using SQLite storage at {}", path.display());
            Ok(Arc::new(SqliteStorage::new_with_path(&path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(Error::Config(
            "SQLite storage requires building with the `sqlite` feature".to_string(),
        )),
        other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::create_storage;
}
