use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_rss, RawFeed};
use crate::util::validate_feed_url;

/// Default cap on a feed body (10MB).
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024;

/// Default bound on one whole fetch: connect, send, and body read.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching one feed.
///
/// Each variant is a distinct, non-fatal failure. None of them are retried
/// here; the feed is simply eligible again on a later cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL cannot be turned into a request
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The fetch exceeded its time budget
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not a readable RSS document
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of raw feed documents.
///
/// The scheduler depends on this rather than on HTTP directly.
#[async_trait]
pub trait FetchFeed: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError>;
}

/// HTTP implementation of [`FetchFeed`].
///
/// Holds one pooled `reqwest::Client`; clone it freely. Dropping the future
/// returned by [`RemoteFetcher::fetch`] aborts the in-flight request.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl RemoteFetcher {
    /// Build a fetcher with its own client.
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(client, timeout, max_bytes))
    }

    /// Wrap an existing client (caller controls its configuration).
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
        }
    }

    /// Fetch `url` and parse it as RSS.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - not an absolute http(s) URL
    /// - [`FetchError::Network`] - connection, TLS or body stream failure,
    ///   including a body shorter than its Content-Length
    /// - [`FetchError::Timeout`] - the whole operation exceeded the timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] - body over the size limit
    /// - [`FetchError::Parse`] - body is not RSS
    pub async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        let url = validate_feed_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let bytes = tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout)??;

        parse_rss(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn download(&self, url: url::Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url.as_str()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

#[async_trait]
impl FetchFeed for RemoteFetcher {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        RemoteFetcher::fetch(self, url).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
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

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Channel</title>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher() -> RemoteFetcher {
        RemoteFetcher::with_client(
            reqwest::Client::new(),
            Duration::from_secs(5),
            DEFAULT_MAX_FEED_BYTES,
        )
    }

    async fn serve(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .await;

        let feed = fetcher()
            .fetch(&format!("{}/feed", server.uri()))
            .await
            .unwrap();
        assert_eq!(feed.title, "Test Channel");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link, "https://example.com/1");
    }

    #[tokio::test]
    async fn test_fetch_makes_exactly_one_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let server = serve(ResponseTemplate::new(404)).await;
        match fetcher().fetch(&format!("{}/feed", server.uri())).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_parse_error() {
        let server = serve(ResponseTemplate::new(200).set_body_string("<not valid xml")).await;
        match fetcher().fetch(&format!("{}/feed", server.uri())).await {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let server = serve(ResponseTemplate::new(200).set_body_string(VALID_RSS)).await;
        let small = RemoteFetcher::with_client(reqwest::Client::new(), Duration::from_secs(5), 16);
        match small.fetch(&format!("{}/feed", server.uri())).await {
            Err(FetchError::ResponseTooLarge) => {}
            other => panic!("Expected ResponseTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(2)),
        )
        .await;
        let impatient = RemoteFetcher::with_client(
            reqwest::Client::new(),
            Duration::from_millis(100),
            DEFAULT_MAX_FEED_BYTES,
        );
        match impatient.fetch(&format!("{}/feed", server.uri())).await {
            Err(FetchError::Timeout) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        match fetcher().fetch("not a url").await {
            Err(FetchError::InvalidUrl(_)) => {}
            other => panic!("Expected InvalidUrl, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Bind and drop a listener to get a port nobody is serving
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        match fetcher().fetch(&format!("http://127.0.0.1:{port}/feed")).await {
            Err(FetchError::Network(_)) => {}
            other => panic!("Expected Network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_is_network_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Promise 1000 bytes, send a fragment, then hang up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n<rss><channel>")
                .await
                .unwrap();
            socket.shutdown().await.ok();
        });

        match fetcher().fetch(&format!("http://{addr}/feed")).await {
            Err(FetchError::Network(_)) => {}
            other => panic!("Expected Network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_empty_channel() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#),
        )
        .await;
        let feed = fetcher()
            .fetch(&format!("{}/feed", server.uri()))
            .await
            .unwrap();
        assert!(feed.items.is_empty());
    }
}
