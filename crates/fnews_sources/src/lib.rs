pub mod cli;
pub mod dedup;
pub mod keywords;
pub mod logging;
pub mod orchestrator;
pub mod rate_limiter;
pub mod requester;
pub mod sources;

#[cfg(test)]
mod test_utils;

pub use cli::{handle_command, CollectArgs, SourceCommands};
pub use dedup::{merge, title_similarity, Deduplicator};
pub use orchestrator::{CollectReport, FetchStatus, Orchestrator, Phase, SourceReport};
pub use rate_limiter::RateLimiter;
pub use requester::{HttpResponse, HttpTransport, ReqwestTransport, ResilientRequester, RetryPolicy, TransportError};
pub use sources::{build_adapters, SourceAdapter, SourceContext};

pub mod prelude {
    pub use super::orchestrator::Orchestrator;
    pub use super::sources::SourceAdapter;
    pub use fnews_core::{Article, Error, Result};
}
