//! yt-dlp integration
//!
//! Last-resort stream resolution: ask yt-dlp for the media URLs behind a page.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Upper bound on resolver output kept in memory
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Extensions of assets that are never a playable stream
const ASSET_EXTENSIONS: &[&str] = &[".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".ico"];

/// External resolver errors
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("'{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to run resolver: {0}")]
    Io(#[from] std::io::Error),
    #[error("Resolver timed out after {0:?}")]
    Timeout(Duration),
    #[error("Resolver exited with status {0}")]
    Failed(i32),
}

/// A general-purpose utility that turns a page URL into candidate media URLs
#[async_trait]
pub trait ExternalResolver: Send + Sync {
    /// Return candidate URLs, one per line of output
    async fn resolve(
        &self,
        url: &str,
        user_agent: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ResolverError>;
}

/// Pick the first candidate that looks like a media URL rather than an image
pub fn first_media_url<S: AsRef<str>>(candidates: &[S]) -> Option<String> {
    candidates
        .iter()
        .map(|c| c.as_ref().trim())
        .find(|line| line.starts_with("http") && !is_asset(line))
        .map(str::to_string)
}

fn is_asset(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// yt-dlp subprocess resolver
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }

    /// Use a custom yt-dlp binary path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
        }
    }

    /// Whether the binary can be found
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ExternalResolver for YtDlp {
    async fn resolve(
        &self,
        url: &str,
        user_agent: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ResolverError> {
        let mut child = Command::new(&self.binary)
            .arg("--get-url")
            .arg("--quiet")
            .arg("--no-check-certificates")
            .arg("--referer")
            .arg(referer)
            .arg("--user-agent")
            .arg(user_agent)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ResolverError::NotFound(self.binary.clone())
                } else {
                    ResolverError::Io(e)
                }
            })?;

        let stdout = child.stdout.take();
        let run = async {
            let mut buf = Vec::new();
            if let Some(stdout) = stdout {
                stdout
                    .take(MAX_OUTPUT_BYTES as u64)
                    .read_to_end(&mut buf)
                    .await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, buf))
        };

        let (status, buf) = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| ResolverError::Timeout(timeout))??;

        if !status.success() {
            return Err(ResolverError::Failed(status.code().unwrap_or(-1)));
        }

        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}
