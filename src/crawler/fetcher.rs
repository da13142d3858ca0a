//! HTTP fetcher implementation
//!
//! This module handles all API requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Attaching the active credential to every request
//! - Feeding quota telemetry to the rate limiter
//! - Retrying quota rejections on another credential, bounded by the pool size
//! - Classifying every outcome into a `FetchResult`
//!
//! Nothing in here returns an error: callers always receive a `FetchResult`.

use crate::config::ApiConfig;
use crate::crawler::parser::{is_rate_limit_message, next_page_link, parse_rate_status};
use crate::crawler::rate_limit::{RateDecision, RateLimiter};
use crate::SieveError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const API_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Quota waits allowed for a single request before it is reported as rejected
const MAX_QUOTA_WAITS: u32 = 2;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// HTTP 200 with a JSON body
    Success {
        body: Value,
        /// Target of the `rel="next"` link, when the response is paginated
        next_page: Option<String>,
    },

    /// The resource does not exist (404), or the body was not JSON
    NoData { status_code: u16 },

    /// Any other non-success status
    HttpError { status_code: u16, message: String },

    /// Connection refused, timeout, TLS failure, truncated body
    NetworkError { error: String },

    /// A rate-limit wait was cut short by shutdown
    Interrupted,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failures that may succeed on a later attempt
    ///
    /// Quota rejections, server errors, and transport failures are transient. A 404 or
    /// other client error is a definitive answer about the resource.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError { status_code, .. } => {
                matches!(*status_code, 403 | 429) || *status_code >= 500
            }
            Self::NetworkError { .. } => true,
            Self::Success { .. } | Self::NoData { .. } | Self::Interrupted => false,
        }
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            Self::Success { .. } => "ok".to_string(),
            Self::NoData { status_code } => format!("no data (HTTP {})", status_code),
            Self::HttpError {
                status_code,
                message,
            } => format!("HTTP {}: {}", status_code, truncate(message, 200)),
            Self::NetworkError { error } => format!("network error: {}", error),
            Self::Interrupted => "interrupted".to_string(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use repo_sieve::config::ApiConfig;
/// use repo_sieve::crawler::build_http_client;
///
/// let client = build_http_client(&ApiConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(API_MEDIA_TYPE));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated, rate-limit-aware API client
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl Fetcher {
    pub fn new(client: Client, base_url: Url, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            base_url,
            limiter,
        }
    }

    pub fn from_config(config: &ApiConfig, limiter: Arc<RateLimiter>) -> Result<Self, SieveError> {
        let client = build_http_client(config)?;
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SieveError::InvalidUrl(config.base_url.clone()));
        }
        Ok(Self::new(client, base_url, limiter))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Builds an API URL from path segments, each percent-encoded as needed
    pub fn api_url<I, S>(&self, segments: I) -> Result<Url, SieveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SieveError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Repository search URL for one results page
    pub fn search_url(&self, query: &str, sort: &str, per_page: u32, page: u32) -> Result<Url, SieveError> {
        let mut url = self.api_url(["search", "repositories"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", sort)
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// Repository metadata URL
    pub fn repo_url(&self, owner: &str, name: &str) -> Result<Url, SieveError> {
        self.api_url(["repos", owner, name])
    }

    /// Contents URL of one file; `path` is split on `/`
    pub fn contents_url(&self, owner: &str, name: &str, path: &str) -> Result<Url, SieveError> {
        let segments = ["repos", owner, name, "contents"]
            .into_iter()
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.api_url(segments)
    }

    /// Recursive tree URL of a branch
    pub fn tree_url(&self, owner: &str, name: &str, branch: &str) -> Result<Url, SieveError> {
        let mut url = self.api_url(["repos", owner, name, "git", "trees", branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        Ok(url)
    }

    /// Performs a GET request
    ///
    /// # Request Flow
    ///
    /// 1. Attach the active credential, if any
    /// 2. Send the request and read the body
    /// 3. Pass the quota telemetry to the rate limiter
    /// 4. Classify the status
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | HTTP 200, JSON body | `Success` |
    /// | HTTP 200, other body | `NoData` |
    /// | HTTP 404 | `NoData` |
    /// | HTTP 403 mentioning the rate limit | retry on a new credential, then `HttpError` |
    /// | Other status | `HttpError` |
    /// | Transport failure | `NetworkError` |
    /// | Wait interrupted | `Interrupted` |
    ///
    /// A quota rejection is retried only after the limiter rotated or waited. Rotations
    /// are bounded by the pool size and waits by `MAX_QUOTA_WAITS`. A completed wait is
    /// always followed by a retry, including for a single credential or none.
    pub async fn fetch(&self, url: &Url) -> FetchResult {
        let max_rotations = self.limiter.pool().len().saturating_sub(1);
        let mut rotations = 0;
        let mut waits = 0;

        loop {
            let credential = self.limiter.pool().current();
            let secret = credential.as_ref().map(|c| c.secret().to_string());

            let mut request = self.client.get(url.clone());
            if let Some(credential) = &credential {
                request = request.header(AUTHORIZATION, credential.authorization());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Request to {} failed: {}", url, e);
                    return FetchResult::NetworkError {
                        error: e.to_string(),
                    };
                }
            };

            let status = response.status();
            let telemetry = parse_rate_status(response.headers());
            let next_page = next_page_link(response.headers());

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Reading response from {} failed: {}", url, e);
                    return FetchResult::NetworkError {
                        error: e.to_string(),
                    };
                }
            };

            let decision = match telemetry {
                Some(telemetry) => self.limiter.apply(telemetry, secret.as_deref()).await,
                None => RateDecision::Ok,
            };
            if decision == RateDecision::Interrupted {
                return FetchResult::Interrupted;
            }

            if status == StatusCode::OK {
                return match serde_json::from_str(&text) {
                    Ok(body) => FetchResult::Success { body, next_page },
                    Err(e) => {
                        tracing::warn!("Response from {} is not JSON: {}", url, e);
                        FetchResult::NoData {
                            status_code: status.as_u16(),
                        }
                    }
                };
            }

            if status == StatusCode::NOT_FOUND {
                tracing::debug!("Not found: {}", url);
                return FetchResult::NoData {
                    status_code: status.as_u16(),
                };
            }

            if status == StatusCode::FORBIDDEN && is_rate_limit_message(&text) {
                let retry = match decision {
                    RateDecision::Waited if waits < MAX_QUOTA_WAITS => {
                        waits += 1;
                        tracing::info!("Quota renewed, retrying {}", url);
                        true
                    }
                    RateDecision::Rotated if rotations < max_rotations => true,
                    RateDecision::Ok if rotations < max_rotations => {
                        self.limiter
                            .rotate_after_rejection(secret.as_deref())
                            .await
                    }
                    _ => false,
                };

                if retry {
                    if decision != RateDecision::Waited {
                        rotations += 1;
                        tracing::warn!(
                            "Rate limit hit on {}, retrying with another token ({}/{})",
                            url,
                            rotations,
                            max_rotations
                        );
                    }
                    continue;
                }
                tracing::warn!(
                    "Rate limit hit on {}, giving up after {} rotations and {} waits",
                    url,
                    rotations,
                    waits
                );
            } else {
                tracing::warn!("HTTP {} from {}", status.as_u16(), url);
            }

            return FetchResult::HttpError {
                status_code: status.as_u16(),
                message: text,
            };
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::rate_limit::RateLimitPolicy;
    use crate::crawler::shutdown::ShutdownListener;
    use crate::state::CredentialPool;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, tokens: &[&str]) -> Fetcher {
        let pool = Arc::new(CredentialPool::new(
            tokens.iter().map(|t| t.to_string()).collect(),
        ));
        let limiter = Arc::new(RateLimiter::new(
            pool,
            RateLimitPolicy::default(),
            ShutdownListener::never(),
        ));
        let config = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        Fetcher::from_config(&config, limiter).unwrap()
    }

    fn reset_header() -> String {
        (chrono::Utc::now().timestamp() + 3600).to_string()
    }

    #[test]
    fn test_url_building() {
        let pool = Arc::new(CredentialPool::new(vec![]));
        let limiter = Arc::new(RateLimiter::new(
            pool,
            RateLimitPolicy::default(),
            ShutdownListener::never(),
        ));
        let fetcher = Fetcher::from_config(&ApiConfig::default(), limiter).unwrap();

        assert_eq!(
            fetcher.repo_url("alice", "api").unwrap().as_str(),
            "https://api.github.com/repos/alice/api"
        );
        assert_eq!(
            fetcher
                .contents_url("alice", "api", "src/my app/main.py")
                .unwrap()
                .as_str(),
            "https://api.github.com/repos/alice/api/contents/src/my%20app/main.py"
        );
        assert_eq!(
            fetcher.tree_url("alice", "api", "main").unwrap().as_str(),
            "https://api.github.com/repos/alice/api/git/trees/main?recursive=1"
        );

        let search = fetcher
            .search_url("language:Python created:2020-01-01..2020-01-15", "stars", 100, 3)
            .unwrap();
        assert_eq!(search.path(), "/search/repositories");
        let pairs: Vec<(String, String)> = search.query_pairs().into_owned().collect();
        assert_eq!(
            pairs[0],
            (
                "q".to_string(),
                "language:Python created:2020-01-01..2020-01-15".to_string()
            )
        );
        assert_eq!(pairs[3], ("page".to_string(), "3".to_string()));
    }

    #[tokio::test]
    async fn test_success_sends_credential_and_reads_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/alice/api"))
            .and(header("authorization", "token t1"))
            .and(header("accept", API_MEDIA_TYPE))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", r#"<http://x.test/next?page=2>; rel="next""#)
                    .set_body_json(json!({"default_branch": "develop"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &["t1"]);
        let url = fetcher.repo_url("alice", "api").unwrap();
        match fetcher.fetch(&url).await {
            FetchResult::Success { body, next_page } => {
                assert_eq!(body["default_branch"], "develop");
                assert_eq!(next_page.as_deref(), Some("http://x.test/next?page=2"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &[]);
        let url = fetcher.contents_url("a", "b", "requirements.txt").unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, FetchResult::NoData { status_code: 404 }));
        assert!(!result.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &["t1", "t2"]);
        let url = fetcher.repo_url("a", "b").unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(
            result,
            FetchResult::HttpError { status_code: 502, .. }
        ));
        assert!(result.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_retries_on_next_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "token t1"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset_header().as_str())
                    .set_body_string(r#"{"message":"API rate limit exceeded"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "token t2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "4999")
                    .insert_header("x-ratelimit-reset", reset_header().as_str())
                    .set_body_json(json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &["t1", "t2"]);
        let url = fetcher.repo_url("a", "b").unwrap();
        assert!(fetcher.fetch(&url).await.is_success());
        assert_eq!(fetcher.limiter().pool().current().unwrap().secret(), "t2");
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded_by_pool_size() {
        let server = MockServer::start().await;
        // No telemetry, so the limiter never sleeps; every token is rejected
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_string(r#"{"message":"You have exceeded a secondary rate limit"}"#),
            )
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &["t1", "t2", "t3"]);
        let url = fetcher.repo_url("a", "b").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            FetchResult::HttpError { status_code: 403, .. }
        ));
    }

    #[tokio::test]
    async fn test_single_token_retries_after_quota_wait() {
        let server = MockServer::start().await;
        let reset = (chrono::Utc::now().timestamp() + 2).to_string();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset.as_str())
                    .set_body_string(r#"{"message":"API rate limit exceeded"}"#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let limiter = Arc::new(RateLimiter::new(
            Arc::new(CredentialPool::new(vec!["t1".to_string()])),
            RateLimitPolicy {
                reset_margin: Duration::ZERO,
                ..RateLimitPolicy::default()
            },
            ShutdownListener::never(),
        ));
        let config = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        let fetcher = Fetcher::from_config(&config, limiter).unwrap();
        let url = fetcher.repo_url("a", "b").unwrap();

        let result = fetcher.fetch(&url).await;
        assert!(result.is_success(), "unexpected result: {:?}", result);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_without_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string(r#"{"message":"Repository access blocked"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &["t1", "t2"]);
        let url = fetcher.repo_url("a", "b").unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, FetchResult::HttpError { status_code: 403, .. }));
        assert_eq!(fetcher.limiter().pool().current().unwrap().secret(), "t1");
    }

    #[tokio::test]
    async fn test_non_json_success_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, &[]);
        let url = fetcher.tree_url("a", "b", "main").unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            FetchResult::NoData { status_code: 200 }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(CredentialPool::new(vec![])),
            RateLimitPolicy::default(),
            ShutdownListener::never(),
        ));
        let config = ApiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 5,
            ..ApiConfig::default()
        };
        let fetcher = Fetcher::from_config(&config, limiter).unwrap();
        let url = fetcher.repo_url("a", "b").unwrap();

        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, FetchResult::NetworkError { .. }));
        assert!(result.is_transient());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
