//! Remote asset fetching

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mlbench_core::{Error, Result};
use reqwest::Client;
use tokio::io::AsyncWriteExt;

/// Fetches remote assets to local files
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Remote size in bytes, if the server reports one
    async fn content_length(&self, url: &str) -> Result<Option<u64>>;

    /// Stream `url` into `dest`, reporting each received chunk's length.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path, on_bytes: &(dyn Fn(u64) + Send + Sync))
        -> Result<u64>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout; large datasets need a generous one
    pub request_timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60 * 60),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("mlbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Create config with custom request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create config with custom connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

/// Connection-level failures mean there is no usable network
fn classify(url: &str, err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::NetworkUnavailable(format!("{url}: {err}"))
    } else {
        Error::acquire(url, err.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn content_length(&self, url: &str) -> Result<Option<u64>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(response.content_length())
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        on_bytes: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::acquire(url, format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            on_bytes(chunk.len() as u64);
        }
        file.flush().await?;

        tracing::debug!(url, bytes = written, dest = %dest.display(), "Download complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_creation() {
        let config = HttpConfig::default().with_connect_timeout(Duration::from_secs(5));
        assert!(HttpFetcher::new(&config).is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(3600));
        assert!(config.user_agent.starts_with("mlbench/"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_unavailable() {
        let config = HttpConfig::default().with_connect_timeout(Duration::from_millis(200));
        let fetcher = HttpFetcher::new(&config).unwrap();

        // nothing listens on the discard port of localhost
        let err = fetcher
            .content_length("http://127.0.0.1:9/tasks.json")
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
