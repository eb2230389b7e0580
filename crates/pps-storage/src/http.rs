use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

/// Whether a reply is worth asking for again: throttling or a server fault.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Only these methods are replayed; a POST that timed out may still have
/// landed upstream.
pub fn is_replayable(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}

/// How many extra attempts a replayable request gets, and the pause before
/// each one (doubling from `initial_delay`, never above `ceiling`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub extra_attempts: usize,
    pub initial_delay: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            extra_attempts: 2,
            initial_delay: Duration::from_millis(250),
            ceiling: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            extra_attempts: 0,
            ..Self::default()
        }
    }

    pub fn pause_before(&self, retry: usize) -> Duration {
        let shift = u32::try_from(retry).unwrap_or(u32::MAX).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.ceiling)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    Status {
        status: u16,
        url: String,
        body: JsonValue,
    },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decoded reply. Error statuses are returned as values so callers can map them.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: JsonValue,
}

impl JsonResponse {
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(HttpError::Status {
                status: self.status.as_u16(),
                url: self.url,
                body: self.body,
            })
        }
    }
}

/// Shared JSON client with bounded concurrency. Idempotent requests are
/// retried on transient failures; everything else is sent exactly once.
#[derive(Debug)]
pub struct JsonHttpClient {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl JsonHttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            retry: config.retry,
        })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Sends with the client's retry policy. Non-idempotent methods are
    /// never replayed.
    pub async fn send(&self, request: RequestBuilder) -> Result<JsonResponse, HttpError> {
        self.dispatch(request, self.retry).await
    }

    /// Sends exactly once, for callers that pace their own retries.
    pub async fn send_once(&self, request: RequestBuilder) -> Result<JsonResponse, HttpError> {
        self.dispatch(request, RetryPolicy::none()).await
    }

    async fn dispatch(&self, request: RequestBuilder, policy: RetryPolicy) -> Result<JsonResponse, HttpError> {
        let (client, request) = request.build_split();
        let request = request?;
        let span = info_span!("http_json", method = %request.method(), url = %request.url());
        let budget = if is_replayable(request.method()) {
            policy.extra_attempts
        } else {
            0
        };

        async move {
            // The semaphore lives as long as the client and is never closed.
            let _permit = self.limit.acquire().await.ok();
            let mut retry = 0usize;
            loop {
                let copy = if retry < budget { request.try_clone() } else { None };
                let Some(attempt) = copy else {
                    return decode(client.execute(request).await?).await;
                };
                match client.execute(attempt).await {
                    Ok(resp) if is_transient_status(resp.status()) => {
                        debug!(retry, status = resp.status().as_u16(), "transient status; sending again");
                    }
                    Ok(resp) => return decode(resp).await,
                    Err(err) if is_transient_error(&err) => {
                        debug!(retry, error = %err, "transport error; sending again");
                    }
                    Err(err) => return Err(HttpError::Request(err)),
                }
                tokio::time::sleep(policy.pause_before(retry)).await;
                retry += 1;
            }
        }
        .instrument(span)
        .await
    }
}

async fn decode(resp: reqwest::Response) -> Result<JsonResponse, HttpError> {
    let status = resp.status();
    let url = resp.url().to_string();
    let bytes = resp.bytes().await?;
    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        JsonValue::Null
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                JsonValue::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            Err(source) => return Err(HttpError::Decode { url, source }),
        }
    };
    Ok(JsonResponse { status, url, body })
}
