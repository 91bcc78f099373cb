//! Page fetching
//!
//! The resolution cascade and the site scraper only ever talk to the network
//! through [`PageFetcher`], so tests can swap in a scripted fetcher.
//! [`HttpFetcher`] is the real implementation: reqwest first, `curl` as a
//! fallback when the primary request fails or times out.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Desktop browser user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Page fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Fallback fetch failed: {0}")]
    Fallback(String),
}

/// Something that can retrieve page bodies
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch roughly the first `limit` bytes of a page body.
    ///
    /// May return slightly more than `limit` (whole chunks are kept).
    async fn fetch_prefix(
        &self,
        url: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<String, FetchError>;

    /// Fetch a complete page body
    async fn fetch(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher with a curl fallback
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    curl_fallback: bool,
}

impl HttpFetcher {
    /// Create a fetcher with the default user agent
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a fetcher that identifies as `user_agent`
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Self {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .unwrap_or_default(),
            user_agent,
            curl_fallback: true,
        }
    }

    /// Disable the curl fallback (tests, or hosts without curl)
    pub fn without_fallback(mut self) -> Self {
        self.curl_fallback = false;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn fetch_primary(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(FetchError::Request)
    }

    async fn fetch_with_curl(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let secs = timeout.as_secs().max(1);
        let child = Command::new("curl")
            .arg("-s")
            .arg("-L")
            .arg("-m")
            .arg(secs.to_string())
            .arg("-H")
            .arg(format!("User-Agent: {}", self.user_agent))
            .arg("-H")
            .arg("Accept: text/html")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Fallback(e.to_string()))?;

        let output = tokio::time::timeout(timeout + Duration::from_secs(2), child.wait_with_output())
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
            .map_err(|e| FetchError::Fallback(e.to_string()))?;

        if !output.status.success() {
            return Err(FetchError::Fallback(format!("curl exited with {}", output.status)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_prefix(
        &self,
        url: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let read = async {
            let mut response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let mut body = Vec::with_capacity(limit);
            while let Some(chunk) = response.chunk().await? {
                body.extend_from_slice(&chunk);
                if body.len() >= limit {
                    break;
                }
            }
            body.truncate(limit);
            // Dropping the response here closes the connection early
            Ok::<_, FetchError>(String::from_utf8_lossy(&body).into_owned())
        };

        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }

    async fn fetch(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        match self.fetch_primary(url, referer, timeout).await {
            Ok(body) => Ok(body),
            Err(e) if self.curl_fallback => {
                debug!(url, error = %e, "primary fetch failed, trying curl");
                self.fetch_with_curl(url, timeout).await
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}
