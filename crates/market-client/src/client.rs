use flow_core::MarketDataError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport, TransportError};

/// Per-upstream state: its own throttle and auth headers.
struct UpstreamHandle {
    limiter: Arc<RateLimiter>,
    headers: Vec<(String, String)>,
}

/// Rate-limited, retrying JSON GET client shared by all provider adapters.
///
/// Each registered upstream gets its own [`RateLimiter`]; the limiter is
/// acquired before every attempt, retries included.
pub struct ResilientApiClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    timeout: Duration,
    upstreams: HashMap<String, UpstreamHandle>,
}

impl ResilientApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
            upstreams: HashMap::new(),
        }
    }

    /// Client backed by reqwest.
    pub fn with_reqwest() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-call timeout. A timed-out call fails on its own; other in-flight
    /// calls are unaffected.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register an upstream with its request rate (req/s) and auth headers.
    pub fn with_upstream(
        mut self,
        name: &str,
        rate_per_second: f64,
        headers: Vec<(String, String)>,
    ) -> Self {
        self.upstreams.insert(
            name.to_string(),
            UpstreamHandle {
                limiter: Arc::new(RateLimiter::per_second(rate_per_second)),
                headers,
            },
        );
        self
    }

    /// GET `url` with `params` against `upstream`, returning the decoded JSON body.
    pub async fn request(
        &self,
        upstream: &str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Value, MarketDataError> {
        let handle = self.upstreams.get(upstream).ok_or_else(|| {
            MarketDataError::Validation(format!("unknown upstream: {}", upstream))
        })?;

        let request = HttpRequest::get(url)
            .with_query(params)
            .with_headers(&handle.headers)
            .with_timeout(self.timeout);

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            handle.limiter.acquire().await;

            let error = match self.attempt(upstream, request.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    "{} request to {} failed after {} attempts: {}",
                    upstream,
                    url,
                    attempt,
                    error
                );
                return Err(error.into_terminal());
            }

            let delay = self.retry.backoff(attempt - 1);
            tracing::debug!(
                "Retrying {} request (attempt {}/{}) in {:.1}s: {}",
                upstream,
                attempt + 1,
                max_attempts,
                delay.as_secs_f64(),
                error
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, upstream: &str, request: HttpRequest) -> Result<Value, MarketDataError> {
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                let body = e.to_string();
                let retryable = self.retry.retry_on_transport
                    && matches!(e, TransportError::Timeout(_) | TransportError::Connect(_));
                return Err(if retryable {
                    MarketDataError::UpstreamTransient {
                        upstream: upstream.to_string(),
                        status: None,
                        body,
                    }
                } else {
                    MarketDataError::Upstream {
                        upstream: upstream.to_string(),
                        status: None,
                        body,
                    }
                });
            }
        };

        if response.is_success() {
            return serde_json::from_str(&response.body).map_err(|e| {
                MarketDataError::Decode(format!("{} returned invalid JSON: {}", upstream, e))
            });
        }

        if self.retry.should_retry_status(response.status) {
            Err(MarketDataError::UpstreamTransient {
                upstream: upstream.to_string(),
                status: Some(response.status),
                body: response.body,
            })
        } else {
            Err(MarketDataError::Upstream {
                upstream: upstream.to_string(),
                status: Some(response.status),
                body: response.body,
            })
        }
    }
}
