use async_trait::async_trait;
use fnews_core::config::HttpConfig;
use fnews_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_BACKOFF_SECS: f64 = 120.0;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    /// The request could not be built, so no attempt can succeed.
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// One HTTP GET. Anything that produced a status code is `Ok`, even 5xx.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url).query(params).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_builder() {
        TransportError::Invalid(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub initial_wait: Duration,
    pub max_jitter: Duration,
    pub timeout: Duration,
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            initial_wait: Duration::from_millis(config.initial_wait_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl RetryPolicy {
    /// `initial_wait * backoff_factor^attempt`, capped.
    pub fn backoff(&self, attempt: u32, backoff_factor: f64) -> Duration {
        let factor = backoff_factor.max(0.0).powi(attempt as i32);
        let secs = (self.initial_wait.as_secs_f64() * factor).min(MAX_BACKOFF_SECS);
        Duration::from_secs_f64(secs)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// What to do with a response status.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Success,
    Terminal,
    /// Retryable with the given retry budget.
    Retry(u32),
}

fn classify(status: u16, max_retries: u32) -> Verdict {
    match status {
        200..=299 => Verdict::Success,
        403 | 404 => Verdict::Terminal,
        429 | 500..=599 => Verdict::Retry(max_retries),
        400..=499 => Verdict::Retry(max_retries.saturating_sub(1)),
        _ => Verdict::Terminal,
    }
}

#[derive(Clone)]
pub struct ResilientRequester {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl ResilientRequester {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// GET with the configured retry budget and backoff.
    pub async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.execute(url, params, headers, self.policy.max_retries, self.policy.backoff_factor)
            .await
    }

    /// Runs up to `max_retries + 1` attempts. 403/404 stop after the first;
    /// other 4xx get one retry fewer than 429, 5xx and transport failures.
    pub async fn execute(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        max_retries: u32,
        backoff_factor: f64,
    ) -> Result<HttpResponse> {
        let mut attempt: u32 = 0;
        loop {
            let jitter = self.policy.jitter();
            if !jitter.is_zero() {
                sleep(jitter).await;
            }

            let (budget, reason) = match self
                .transport
                .get(url, params, headers, self.policy.timeout)
                .await
            {
                Ok(response) => match classify(response.status, max_retries) {
                    Verdict::Success => {
                        debug!("🌐 {} -> {} after {} attempt(s)", url, response.status, attempt + 1);
                        return Ok(response);
                    }
                    Verdict::Terminal => {
                        return Err(Error::UpstreamTerminal {
                            status: response.status,
                            url: url.to_string(),
                        });
                    }
                    Verdict::Retry(budget) => (budget, format!("status {}", response.status)),
                },
                Err(TransportError::Invalid(reason)) => {
                    return Err(Error::InvalidUrl(format!("{}: {}", url, reason)));
                }
                Err(e) => (max_retries, e.to_string()),
            };

            if attempt >= budget {
                return Err(Error::RetriesExhausted {
                    attempts: attempt + 1,
                    last: format!("{} ({})", reason, url),
                });
            }

            let wait = self.policy.backoff(attempt, backoff_factor);
            warn!(
                "🔁 {} failed with {}; retry {}/{} in {:?}",
                url,
                reason,
                attempt + 1,
                budget,
                wait
            );
            sleep(wait).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fast_policy, MockTransport};

    fn requester(transport: Arc<MockTransport>) -> ResilientRequester {
        ResilientRequester::new(transport, fast_policy())
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(200, 3), Verdict::Success);
        assert_eq!(classify(404, 3), Verdict::Terminal);
        assert_eq!(classify(403, 3), Verdict::Terminal);
        assert_eq!(classify(429, 3), Verdict::Retry(3));
        assert_eq!(classify(503, 3), Verdict::Retry(3));
        assert_eq!(classify(400, 3), Verdict::Retry(2));
        assert_eq!(classify(400, 0), Verdict::Retry(0));
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            initial_wait: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0, 2.0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1, 2.0), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, 2.0), Duration::from_millis(800));
        assert_eq!(policy.backoff(200, 2.0), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_always_429_stops_at_ceiling() {
        let transport = Arc::new(MockTransport::always(429, ""));
        let result = requester(transport.clone())
            .execute("https://api.test/news", &[], &[], 3, 2.0)
            .await;
        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 4, .. })));
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_terminal_status_short_circuits() {
        for status in [403, 404] {
            let transport = Arc::new(MockTransport::always(status, "nope"));
            let result = requester(transport.clone())
                .execute("https://api.test/news", &[], &[], 5, 2.0)
                .await;
            assert!(matches!(result, Err(Error::UpstreamTerminal { status: s, .. }) if s == status));
            assert_eq!(transport.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_recovers_after_server_errors() {
        let transport = Arc::new(MockTransport::scripted(vec![
            Ok(HttpResponse { status: 500, body: String::new() }),
            Ok(HttpResponse { status: 500, body: String::new() }),
            Ok(HttpResponse { status: 200, body: "ok".to_string() }),
        ]));
        let response = requester(transport.clone())
            .execute("https://api.test/news", &[], &[], 3, 2.0)
            .await
            .unwrap();
        assert_eq!(response.body, "ok");
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_other_client_errors_get_one_retry_fewer() {
        let transport = Arc::new(MockTransport::always(400, ""));
        let result = requester(transport.clone())
            .execute("https://api.test/news", &[], &[], 3, 2.0)
            .await;
        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let transport = Arc::new(MockTransport::scripted(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Connect("refused".to_string())),
            Ok(HttpResponse { status: 200, body: "[]".to_string() }),
        ]));
        let response = requester(transport.clone())
            .execute("https://api.test/news", &[], &[], 2, 2.0)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_not_retried() {
        let transport = Arc::new(MockTransport::scripted(vec![
            Err(TransportError::Invalid("relative URL without a base".to_string())),
            Ok(HttpResponse { status: 200, body: "ok".to_string() }),
        ]));
        let result = requester(transport.clone())
            .execute("api.test/news", &[], &[], 3, 2.0)
            .await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_success_is_not_an_error() {
        let transport = Arc::new(MockTransport::always(200, ""));
        let response = requester(transport).get("https://api.test/news", &[], &[]).await.unwrap();
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_user_agent_pool() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }
}
