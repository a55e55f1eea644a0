//! Retrying HTTP client
//!
//! Wraps reqwest with the provider's rate limiter and the shared
//! `RetryPolicy` state machine. Maps terminal outcomes onto `ProviderError`.

use std::sync::Arc;
use std::time::Duration;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::Mutex;

use crate::domain::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::ports::ProviderError;
use super::rate_limit::RateLimiter;

/// Classify an HTTP status for the retry state machine
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> AttemptOutcome {
    if status.is_success() {
        return AttemptOutcome::Success;
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return AttemptOutcome::Transient {
            retry_after: retry_after(headers),
        };
    }
    AttemptOutcome::Fatal
}

/// Retry-After in delta-seconds form (HTTP-date form is ignored)
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// HTTP client bound to one provider
#[derive(Debug, Clone)]
pub struct RetryingClient {
    provider: String,
    http: Client,
    policy: RetryPolicy,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl RetryingClient {
    pub fn new(
        provider: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
        limiter: RateLimiter,
    ) -> Result<Self, ProviderError> {
        let provider = provider.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Client {
                provider: provider.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            provider,
            http,
            policy,
            limiter: Arc::new(Mutex::new(limiter)),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Send the request built by `build` until it succeeds, fails fatally,
    /// or the policy gives up
    pub async fn send<F>(&self, build: F) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send_with(build, &[]).await
    }

    /// Like `send`, but responses with a `passthrough` status are handed
    /// back to the caller instead of being turned into an error
    pub async fn send_with<F>(&self, build: F, passthrough: &[StatusCode]) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.lock().await.wait_if_needed().await;

            let (outcome, result) = match build(&self.http).send().await {
                Ok(response) if passthrough.contains(&response.status()) => {
                    (AttemptOutcome::Success, Ok(response))
                }
                Ok(response) => (
                    classify_status(response.status(), response.headers()),
                    Ok(response),
                ),
                Err(e) => (AttemptOutcome::Transient { retry_after: None }, Err(e)),
            };

            match self.policy.decide(attempt, outcome) {
                RetryDecision::Done => {
                    return result.map_err(|e| self.unavailable(attempt, e.to_string()));
                }
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        "{}: {} - backing off for {:?} (attempt {}/{})",
                        self.provider,
                        describe(&result),
                        delay,
                        attempt,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    return Err(self.unavailable(attempt, describe(&result)));
                }
                RetryDecision::Abort => {
                    return Err(match result {
                        Ok(response) => self.fatal(response).await,
                        Err(e) => self.unavailable(attempt, e.to_string()),
                    });
                }
            }
        }
    }

    fn unavailable(&self, attempts: u32, reason: String) -> ProviderError {
        ProviderError::Unavailable {
            provider: self.provider.clone(),
            attempts,
            reason,
        }
    }

    async fn fatal(&self, response: Response) -> ProviderError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProviderError::Auth {
                provider: self.provider.clone(),
                status: status.as_u16(),
            };
        }

        let body: String = response.text().await.unwrap_or_default().chars().take(200).collect();
        ProviderError::Rejected {
            provider: self.provider.clone(),
            status: status.as_u16(),
            body,
        }
    }
}

fn describe(result: &Result<Response, reqwest::Error>) -> String {
    match result {
        Ok(response) => format!("HTTP {}", response.status()),
        Err(e) if e.is_timeout() => "request timed out".to_string(),
        Err(e) => format!("request failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::stub::{StubResponse, StubServer};
    use reqwest::header::HeaderValue;

    fn transient(after: Option<u64>) -> AttemptOutcome {
        AttemptOutcome::Transient {
            retry_after: after.map(Duration::from_secs),
        }
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify_status(StatusCode::OK, &HeaderMap::new()), AttemptOutcome::Success);
    }

    #[test]
    fn test_classify_rate_limit_and_server_errors() {
        let empty = HeaderMap::new();
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, &empty), transient(None));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, &empty), transient(None));
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, &empty), transient(None));
    }

    #[test]
    fn test_classify_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, &headers), transient(Some(30)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, &headers), transient(None));
    }

    #[test]
    fn test_classify_auth_and_client_errors_are_fatal() {
        let empty = HeaderMap::new();
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, &empty), AttemptOutcome::Fatal);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, &empty), AttemptOutcome::Fatal);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, &empty), AttemptOutcome::Fatal);
    }

    fn stub_client(policy: RetryPolicy) -> RetryingClient {
        RetryingClient::new(
            "stub",
            Duration::from_secs(5),
            policy,
            RateLimiter::new(1000, Duration::ZERO),
        )
        .unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)).without_jitter()
    }

    #[tokio::test]
    async fn test_send_succeeds_after_transient_failures() {
        let server = StubServer::start(vec![
            StubResponse::new(503, "busy"),
            StubResponse::new(503, "busy"),
            StubResponse::new(200, "ok"),
        ])
        .await;
        let client = stub_client(fast_policy());

        let response = client.send(|http| http.get(&server.url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_send_gives_up_after_max_attempts() {
        let server = StubServer::start(vec![StubResponse::new(503, "busy")]).await;
        let client = stub_client(fast_policy());

        let err = client.send(|http| http.get(&server.url)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { attempts: 3, .. }));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_send_auth_failure_is_not_retried() {
        for status in [401, 403] {
            let server = StubServer::start(vec![StubResponse::new(status, "denied")]).await;
            let client = stub_client(fast_policy());

            let err = client.send(|http| http.get(&server.url)).await.unwrap_err();
            assert!(err.is_auth());
            assert!(matches!(err, ProviderError::Auth { status: s, .. } if s == status));
            assert_eq!(server.hits(), 1);
        }
    }

    #[tokio::test]
    async fn test_send_client_error_is_rejected_with_body() {
        let server = StubServer::start(vec![StubResponse::new(404, "no such coin")]).await;
        let client = stub_client(fast_policy());

        let err = client.send(|http| http.get(&server.url)).await.unwrap_err();
        match err {
            ProviderError::Rejected { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such coin");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_send_honours_retry_after() {
        // Backoff alone would wait a minute; Retry-After: 0 retries at once
        let server = StubServer::start(vec![
            StubResponse::new(429, "slow down").with_header("retry-after", "0"),
            StubResponse::new(200, "ok"),
        ])
        .await;
        let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60)).without_jitter();
        let client = stub_client(policy);

        let response = tokio::time::timeout(Duration::from_secs(5), client.send(|http| http.get(&server.url)))
            .await
            .expect("Retry-After: 0 should not wait for the backoff delay")
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_send_caps_retry_after_at_max_delay() {
        let server = StubServer::start(vec![
            StubResponse::new(429, "slow down").with_header("retry-after", "120"),
            StubResponse::new(200, "ok"),
        ])
        .await;
        let client = stub_client(fast_policy());

        let response = tokio::time::timeout(Duration::from_secs(5), client.send(|http| http.get(&server.url)))
            .await
            .expect("Retry-After should be capped by max_delay")
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_send_with_passes_listed_status_through() {
        let server = StubServer::start(vec![StubResponse::new(400, "{\"error\":{}}")]).await;
        let client = stub_client(fast_policy());

        let response = client
            .send_with(|http| http.get(&server.url), &[StatusCode::BAD_REQUEST])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn test_client_creation() {
        let client = RetryingClient::new(
            "coingecko",
            Duration::from_secs(30),
            RetryPolicy::default(),
            RateLimiter::new(30, Duration::from_secs(2)),
        );
        assert!(client.is_ok());
        assert_eq!(client.unwrap().provider(), "coingecko");
    }
}
