use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::util::{validate_url, HostPolicy};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Transport-level failures of a feed fetch.
///
/// A non-2xx status is not a `FetchError`: the response still carries the
/// caching headers the crawler needs, so callers inspect
/// [`FeedResponse::status`] themselves. The same holds for failures while
/// reading the body, which land in [`FeedResponse::body`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Status, headers and body of one feed request.
#[derive(Debug)]
pub struct FeedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Body of a 2xx response, empty for other statuses. A body that was
    /// too large, cut short or too slow keeps its error here.
    pub body: Result<Vec<u8>, FetchError>,
}

impl FeedResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Shared client for feed fetches and webhook delivery.
///
/// Follows at most 5 redirects, refuses redirect loops and refuses hops to
/// hosts `host_policy` does not allow.
pub fn build_client(host_policy: HostPolicy) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .redirect(redirect_policy(host_policy))
        .user_agent(concat!("feedbell/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

fn redirect_policy(host_policy: HostPolicy) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.error("Too many redirects (max 5)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = validate_url(url.as_str(), host_policy) {
            tracing::warn!(to = %url, error = %e, "Refusing redirect");
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// GET a feed, bounding connect, headers and body read by one `timeout`.
///
/// Once headers arrive the call succeeds; body failures are reported in
/// [`FeedResponse::body`] so the caching headers are never lost.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - No response headers within `timeout`
///
/// The body may carry [`FetchError::Timeout`],
/// [`FetchError::ResponseTooLarge`] (over 10MB) or
/// [`FetchError::IncompleteResponse`] (shorter than Content-Length).
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<FeedResponse, FetchError> {
    let deadline = Instant::now() + timeout;

    let response = timeout_at(deadline, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)??;

    let status = response.status();
    let headers = response.headers().clone();
    tracing::debug!(url = %url, status = %status, "Fetched feed");

    // Error bodies are not parsed, skip reading them
    let body = if status.is_success() {
        timeout_at(deadline, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .unwrap_or(Err(FetchError::Timeout))
    } else {
        Ok(Vec::new())
    };

    Ok(FeedResponse {
        status,
        headers,
        body,
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn test_fetch_success_returns_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<rss/>")
                    .insert_header("Cache-Control", "max-age=60"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = fetch(&client, &format!("{}/feed", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body.unwrap(), b"<rss/>");
        assert_eq!(
            response.headers.get("cache-control").unwrap(),
            "max-age=60"
        );
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).insert_header("Cache-Control", "max-age=5"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = fetch(&client, &format!("{}/feed", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.is_success());
        assert!(response.body.unwrap().is_empty());
        assert!(response.headers.contains_key("cache-control"));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<rss/>")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch(
            &client,
            &format!("{}/feed", mock_server.uri()),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&mock_server)
            .await;

        let client = build_client(HostPolicy::AllowPrivate).unwrap();
        let response = fetch(&client, &format!("{}/old", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body.unwrap(), b"<rss/>");
    }

    #[tokio::test]
    async fn test_redirect_to_private_host_refused() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&mock_server)
            .await;

        // The first hop is the caller's to validate; only redirects are checked here
        let client = build_client(HostPolicy::PublicOnly).unwrap();
        let err = fetch(&client, &format!("{}/old", mock_server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/old");
    }

    #[tokio::test]
    async fn test_oversized_body_keeps_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![b'x'; MAX_FEED_SIZE + 1])
                    .insert_header("Cache-Control", "max-age=600"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = fetch(&client, &format!("{}/feed", mock_server.uri()), TIMEOUT)
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.headers.get("cache-control").unwrap(), "max-age=600");
        assert!(matches!(response.body, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_fetch_redirect_loop_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let client = build_client(HostPolicy::AllowPrivate).unwrap();
        let err = fetch(&client, &format!("{}/loop", mock_server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let client = reqwest::Client::new();
        // Port 9 (discard) is reserved and closed on test hosts
        let err = fetch(&client, "http://127.0.0.1:9/feed", TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout));
    }
}
