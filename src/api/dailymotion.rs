//! Dailymotion metadata client
//!
//! Most donghua sites embed Dailymotion players. The embed only carries a
//! video id; the actual HLS manifests come from the player metadata endpoint,
//! one list per quality tier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::fetcher::{FetchError, PageFetcher};

/// Quality tiers tried in order; mid-tier first to keep mobile data low
pub const QUALITY_PREFERENCE: &[&str] = &["380", "360", "480", "240", "auto"];

/// Manifest type accepted as streamable
pub const HLS_MIME: &str = "application/x-mpegURL";

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"geo\.dailymotion\.com/player/[^.]+\.html\?video=([^&\s]+)",
        r"dailymotion\.com/embed/video/([a-zA-Z0-9]+)",
        r"dailymotion\.com/(?:video|embed)/([a-zA-Z0-9]+)",
        r"dai\.ly/([a-zA-Z0-9]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Dailymotion errors
#[derive(Error, Debug)]
pub enum DailymotionError {
    #[error("Metadata request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid metadata: {0}")]
    InvalidResponse(String),

    #[error("No HLS stream in metadata for {0}")]
    NoStream(String),
}

/// Player metadata response (only the fields we use)
#[derive(Debug, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub qualities: HashMap<String, Vec<QualityEntry>>,
}

/// One stream offered for a quality tier
#[derive(Debug, Deserialize)]
pub struct QualityEntry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

impl VideoMetadata {
    /// First HLS manifest following [`QUALITY_PREFERENCE`]
    pub fn select_stream(&self) -> Option<&str> {
        QUALITY_PREFERENCE.iter().find_map(|q| {
            self.qualities.get(*q)?.iter().find_map(|entry| {
                match (entry.kind.as_deref(), entry.url.as_deref()) {
                    (Some(HLS_MIME), Some(url)) if !url.is_empty() => Some(url),
                    _ => None,
                }
            })
        })
    }
}

/// Extract a Dailymotion video id from an embed or watch URL
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url)?.get(1).map(|m| m.as_str().to_string()))
}

/// Canonical watch page for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.dailymotion.com/video/{}", video_id)
}

/// Dailymotion metadata client
pub struct DailymotionClient {
    base_url: String,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
}

impl DailymotionClient {
    /// Create a client against the public metadata endpoint
    pub fn new(fetcher: Arc<dyn PageFetcher>, timeout: Duration) -> Self {
        Self::with_base_url(fetcher, timeout, "https://www.dailymotion.com")
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(
        fetcher: Arc<dyn PageFetcher>,
        timeout: Duration,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetcher,
            timeout,
        }
    }

    /// Metadata endpoint for a video id
    pub fn metadata_url(&self, video_id: &str) -> String {
        format!("{}/player/metadata/video/{}", self.base_url, video_id)
    }

    /// Fetch and parse player metadata
    pub async fn metadata(
        &self,
        video_id: &str,
        referer: &str,
    ) -> Result<VideoMetadata, DailymotionError> {
        let body = self
            .fetcher
            .fetch(&self.metadata_url(video_id), Some(referer), self.timeout)
            .await?;
        serde_json::from_str(&body).map_err(|e| DailymotionError::InvalidResponse(e.to_string()))
    }

    /// Resolve a video id to an HLS manifest URL
    pub async fn stream_url(&self, video_id: &str, referer: &str) -> Result<String, DailymotionError> {
        let metadata = self.metadata(video_id, referer).await?;
        metadata
            .select_stream()
            .map(str::to_string)
            .ok_or_else(|| DailymotionError::NoStream(video_id.to_string()))
    }
}
