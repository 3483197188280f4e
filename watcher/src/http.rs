use common::HttpConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, FetchCause, FetchError};

/// Favour syndication formats, accept HTML as a fallback.
pub const ACCEPT_FEED_OR_HTML: &str =
    "application/rss+xml,application/atom+xml,application/xml,text/html;q=0.9,*/*;q=0.8";

/// Shared GET primitive for every fetcher: fixed headers, split timeouts,
/// and at most one retry after a fixed delay.
#[derive(Debug, Clone)]
pub struct HttpAccessor {
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpAccessor {
    pub fn new(config: &HttpConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEED_OR_HTML));

        // reqwest 0.11 has no dedicated read timeout; the overall request timeout
        // bounds the read once the connection is established.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(
                config.connect_timeout_seconds + config.read_timeout_seconds,
            ))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.clamp(1, 2),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// GET `url` and return the raw body bytes, undecoded. Any transport failure
    /// or non-2xx status is retried once; the last failure is surfaced as a
    /// [`FetchError`].
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.attempt(url).await {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(cause) if attempt < self.max_attempts => {
                    info!(
                        "Retrying fetch for {} (attempt {}/{}) after {:?}: {}",
                        url,
                        attempt + 1,
                        self.max_attempts,
                        self.retry_delay,
                        cause
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(cause) => return Err(FetchError::new(url, cause)),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<u8>, FetchCause> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
