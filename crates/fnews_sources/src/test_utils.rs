use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnews_core::config::SourceConfig;
use fnews_core::{Article, SourceType};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::rate_limiter::RateLimiter;
use crate::requester::{HttpResponse, HttpTransport, ResilientRequester, RetryPolicy, TransportError};
use crate::sources::SourceContext;

type Reply = std::result::Result<HttpResponse, TransportError>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Replays a script, then routes by url substring, then falls back.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    routes: Vec<(String, HttpResponse)>,
    fallback: Option<HttpResponse>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn scripted(replies: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn always(status: u16, body: &str) -> Self {
        Self {
            fallback: Some(HttpResponse { status, body: body.to_string() }),
            ..Self::default()
        }
    }

    pub fn routed(routes: Vec<(&str, u16, &str)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(pattern, status, body)| {
                    (pattern.to_string(), HttpResponse { status, body: body.to_string() })
                })
                .collect(),
            fallback: Some(HttpResponse { status: 404, body: String::new() }),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
        _timeout: Duration,
    ) -> Reply {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            params: params.to_vec(),
            headers: headers.to_vec(),
        });

        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        let full = format!(
            "{}?{}",
            url,
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        );
        if let Some((_, response)) = self.routes.iter().find(|(pattern, _)| full.contains(pattern.as_str())) {
            return Ok(response.clone());
        }
        self.fallback
            .clone()
            .ok_or_else(|| TransportError::Connect("no scripted reply".to_string()))
    }
}

/// No jitter, no waiting between retries.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        backoff_factor: 2.0,
        initial_wait: Duration::ZERO,
        max_jitter: Duration::ZERO,
        timeout: Duration::from_secs(1),
    }
}

pub fn context(config: SourceConfig, transport: Arc<MockTransport>) -> SourceContext {
    context_with_limiter(config, transport, Arc::new(RateLimiter::default()))
}

pub fn context_with_limiter(
    config: SourceConfig,
    transport: Arc<MockTransport>,
    limiter: Arc<RateLimiter>,
) -> SourceContext {
    SourceContext::new(config, ResilientRequester::new(transport, fast_policy()), limiter)
}

pub fn article_at(title: &str, url: &str, source: &str, published: DateTime<Utc>) -> Article {
    Article::new(title, url, published, source, SourceType::Feed)
}
