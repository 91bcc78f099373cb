//! Stream resolution cascade
//!
//! Turns an episode page into a playable stream URL by trying strategies in
//! increasing cost order, stopping at the first that succeeds:
//!
//! 1. **Direct** - the reference already names a media container
//! 2. **Partial** - pattern scan over the first few KiB of the page
//! 3. **Structural** - full document parse (scripts, meta tags, iframes)
//! 4. **External** - hand the page to yt-dlp
//!
//! Every tier fails soft: timeouts, HTTP errors and "nothing found" all hand
//! off to the next tier. Total failure is reported as
//! [`Resolution::Unresolved`], never as an error.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::ytdlp::{first_media_url, ExternalResolver};
use crate::api::dailymotion::{self, DailymotionClient};
use crate::api::fetcher::{PageFetcher, DEFAULT_USER_AGENT};
use crate::models::{Resolution, Tier};

/// Container suffixes that need no resolution at all
pub const MEDIA_SUFFIXES: &[&str] = &[".m3u8", ".mp4", ".mkv"];

/// Hosts whose embeds the structural scan follows
pub const KNOWN_HOSTS: &[&str] = &["dailymotion", "ok.ru", "youtube"];

/// Iframe sources that are ads or widgets, never players
pub const DECOY_MARKERS: &[&str] = &["bitcoin", "crypto", "ads", "blogspot"];

/// Shortest absolute URL accepted from an embed page
const MIN_EMBED_URL_LEN: usize = 20;

/// What a partial-scan pattern captures
#[derive(Debug, Clone, Copy)]
enum Marker {
    VideoId,
    Link,
}

/// Partial-scan markers, most specific first
static PREFIX_MARKERS: Lazy<Vec<(Marker, Regex)>> = Lazy::new(|| {
    [
        (Marker::VideoId, r#"data-video\s*=\s*["']([^"']+)["']"#),
        (Marker::Link, r#"src\s*=\s*["'](https?://[^"']*dailymotion[^"']*)["']"#),
        (Marker::Link, r#"src\s*=\s*["'](https?://ok\.[^"']+)["']"#),
    ]
    .into_iter()
    .filter_map(|(marker, p)| Regex::new(p).ok().map(|re| (marker, re)))
    .collect()
});

/// Stream URLs inside an embed page's player config, most specific first
static EMBED_STREAM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)file\s*:\s*["']([^"']+\.m3u8[^"']*)["']"#,
        r#"(?i)source\s*:\s*["']([^"']+\.m3u8[^"']*)["']"#,
        r#"(?i)["']([^"']+\.m3u8[^"']*)["']"#,
        r#"(?i)file\s*:\s*["']([^"']+\.mp4[^"']*)["']"#,
        r#"(?i)["']([^"']+\.mp4[^"']*)["']"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Dailymotion player script carrying the video id as an attribute
static EMBED_PLAYER_SCRIPT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"geo\.dailymotion\.com/player/[^.]+\.js["'][^>]*data-video=["']([^"']+)["']"#).ok()
});

/// Something that resolves episode references to streams
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Resolution;
}

/// Result of a single tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Resolved(String),
    NotFound,
}

/// An embed located on an episode page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    /// A bare Dailymotion video id (needs a metadata lookup)
    DailymotionId(String),
    /// A link to a known video host
    Link(String),
    /// Some other player iframe, worth opening but not playable itself
    Frame(String),
    /// A media URL found inside an embed page
    Stream(String),
}

/// Per-tier budgets
#[derive(Debug, Clone)]
pub struct CascadeSettings {
    /// Bytes read by the partial scan
    pub partial_limit: usize,
    pub partial_timeout: Duration,
    pub full_timeout: Duration,
    pub metadata_timeout: Duration,
    /// Fetching an iframe's player page
    pub embed_timeout: Duration,
    pub external_timeout: Duration,
    pub user_agent: String,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            partial_limit: 8 * 1024,
            partial_timeout: Duration::from_secs(5),
            full_timeout: Duration::from_secs(8),
            metadata_timeout: Duration::from_secs(10),
            embed_timeout: Duration::from_secs(10),
            external_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// The four-tier resolution cascade
pub struct Cascade {
    fetcher: Arc<dyn PageFetcher>,
    external: Arc<dyn ExternalResolver>,
    dailymotion: DailymotionClient,
    settings: CascadeSettings,
}

impl Cascade {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        external: Arc<dyn ExternalResolver>,
        settings: CascadeSettings,
    ) -> Self {
        let dailymotion = DailymotionClient::new(fetcher.clone(), settings.metadata_timeout);
        Self {
            fetcher,
            external,
            dailymotion,
            settings,
        }
    }

    /// Replace the Dailymotion client (custom metadata endpoint)
    pub fn with_dailymotion(mut self, client: DailymotionClient) -> Self {
        self.dailymotion = client;
        self
    }

    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    /// Tier 1: does the reference already name a media container?
    pub fn is_direct_media(reference: &str) -> bool {
        let path = reference
            .split(['?', '#'])
            .next()
            .unwrap_or(reference)
            .to_lowercase();
        MEDIA_SUFFIXES.iter().any(|s| path.ends_with(s))
    }

    /// Tier 2: fetch a bounded prefix and look for high-confidence embed markers
    pub async fn partial_scan(&self, reference: &str) -> TierOutcome {
        let chunk = match self
            .fetcher
            .fetch_prefix(
                reference,
                self.settings.partial_limit,
                self.settings.partial_timeout,
            )
            .await
        {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(reference, error = %e, "partial fetch failed");
                return TierOutcome::NotFound;
            }
        };

        match scan_prefix(&chunk) {
            Some(embed) => self.follow(embed, reference).await,
            None => TierOutcome::NotFound,
        }
    }

    /// Tier 3: fetch and parse the whole document
    pub async fn structural_scan(&self, reference: &str) -> TierOutcome {
        let html = match self
            .fetcher
            .fetch(reference, None, self.settings.full_timeout)
            .await
        {
            Ok(html) => html,
            Err(e) => {
                debug!(reference, error = %e, "full fetch failed");
                return TierOutcome::NotFound;
            }
        };

        match scan_document(&html, reference) {
            Some(embed) => self.follow(embed, reference).await,
            None => TierOutcome::NotFound,
        }
    }

    /// Tier 4: ask the external resolver
    pub async fn external_lookup(&self, reference: &str) -> TierOutcome {
        match self
            .external
            .resolve(
                reference,
                &self.settings.user_agent,
                reference,
                self.settings.external_timeout,
            )
            .await
        {
            Ok(lines) => match first_media_url(&lines) {
                Some(url) => TierOutcome::Resolved(url),
                None => TierOutcome::NotFound,
            },
            Err(e) => {
                debug!(reference, error = %e, "external resolver failed");
                TierOutcome::NotFound
            }
        }
    }

    /// Turn an embed into the best URL we can get for it
    ///
    /// Known-host links fall back to the link itself when their player page
    /// yields nothing; unknown frames hand off to the next tier instead.
    async fn follow(&self, embed: Embed, referer: &str) -> TierOutcome {
        match embed {
            Embed::DailymotionId(id) => {
                TierOutcome::Resolved(self.dailymotion_stream(&id, referer).await)
            }
            Embed::Stream(url) => TierOutcome::Resolved(url),
            Embed::Link(link) => match dailymotion::extract_video_id(&link) {
                Some(id) => TierOutcome::Resolved(self.dailymotion_stream(&id, referer).await),
                None => match self.open_frame(&link, referer).await {
                    Some(url) => TierOutcome::Resolved(url),
                    None => TierOutcome::Resolved(link),
                },
            },
            Embed::Frame(link) => match self.open_frame(&link, referer).await {
                Some(url) => TierOutcome::Resolved(url),
                None => TierOutcome::NotFound,
            },
        }
    }

    /// Fetch an iframe's player page and look for a stream inside it
    async fn open_frame(&self, frame_url: &str, referer: &str) -> Option<String> {
        let html = match self
            .fetcher
            .fetch(frame_url, Some(referer), self.settings.embed_timeout)
            .await
        {
            Ok(html) => html,
            Err(e) => {
                debug!(frame_url, error = %e, "embed fetch failed");
                return None;
            }
        };

        match scan_embed_page(&html)? {
            Embed::Stream(url) => Some(url),
            Embed::DailymotionId(id) => Some(self.dailymotion_stream(&id, frame_url).await),
            _ => None,
        }
    }

    /// HLS manifest for a Dailymotion id, or its watch page if metadata fails
    async fn dailymotion_stream(&self, video_id: &str, referer: &str) -> String {
        match self.dailymotion.stream_url(video_id, referer).await {
            Ok(url) => url,
            Err(e) => {
                debug!(video_id, error = %e, "metadata lookup failed, using watch page");
                dailymotion::watch_url(video_id)
            }
        }
    }
}

#[async_trait]
impl StreamResolver for Cascade {
    async fn resolve(&self, reference: &str) -> Resolution {
        let started = Instant::now();

        if Self::is_direct_media(reference) {
            return Resolution::Resolved {
                url: reference.to_string(),
                tier: Tier::Direct,
            };
        }

        let tiers = [Tier::Partial, Tier::Structural, Tier::External];
        for tier in tiers {
            let outcome = match tier {
                Tier::Partial => self.partial_scan(reference).await,
                Tier::Structural => self.structural_scan(reference).await,
                _ => self.external_lookup(reference).await,
            };

            if let TierOutcome::Resolved(url) = outcome {
                info!(
                    reference,
                    %tier,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stream resolved"
                );
                return Resolution::Resolved { url, tier };
            }
            debug!(reference, %tier, "tier found nothing");
        }

        warn!(reference, "all resolution tiers exhausted");
        Resolution::Unresolved {
            reference: reference.to_string(),
        }
    }
}

/// Tier 2 markers over raw text, most specific first
pub fn scan_prefix(chunk: &str) -> Option<Embed> {
    PREFIX_MARKERS.iter().find_map(|(marker, re)| {
        let value = re.captures(chunk)?.get(1)?.as_str().to_string();
        Some(match marker {
            Marker::VideoId => Embed::DailymotionId(value),
            Marker::Link => Embed::Link(value),
        })
    })
}

/// Tier 3 structural inspection of a full document
pub fn scan_document(html: &str, page_url: &str) -> Option<Embed> {
    let document = Html::parse_document(html);

    if let Ok(scripts) = Selector::parse("script[data-video]") {
        for script in document.select(&scripts) {
            let src = script.value().attr("src").unwrap_or_default();
            if !src.contains("dailymotion") {
                continue;
            }
            if let Some(id) = script.value().attr("data-video").filter(|v| !v.is_empty()) {
                return Some(Embed::DailymotionId(id.to_string()));
            }
        }
    }

    if let Ok(metas) = Selector::parse(r#"meta[content*="dailymotion"], meta[content*="ok.ru"]"#) {
        for meta in document.select(&metas) {
            if let Some(content) = meta.value().attr("content").filter(|c| !c.is_empty()) {
                return Some(Embed::Link(absolutize(content, page_url)));
            }
        }
    }

    if let Ok(iframes) = Selector::parse("iframe") {
        let mut frame = None;
        for iframe in document.select(&iframes) {
            let src = iframe
                .value()
                .attr("src")
                .filter(|s| !s.is_empty())
                .or_else(|| iframe.value().attr("data-src"))
                .filter(|s| !s.is_empty() && !is_decoy(s));
            let Some(src) = src else { continue };
            if KNOWN_HOSTS.iter().any(|host| src.contains(host)) {
                return Some(Embed::Link(absolutize(src, page_url)));
            }
            if frame.is_none() && !src.starts_with("about:") && !src.starts_with("javascript:") {
                frame = Some(Embed::Frame(absolutize(src, page_url)));
            }
        }
        if frame.is_some() {
            return frame;
        }
    }

    None
}

/// Ad and widget iframes that never carry the player
pub fn is_decoy(src: &str) -> bool {
    let src = src.to_lowercase();
    DECOY_MARKERS.iter().any(|marker| src.contains(marker))
}

/// Look inside an iframe's player page: direct media first, then a nested
/// Dailymotion player
pub fn scan_embed_page(html: &str) -> Option<Embed> {
    let stream = EMBED_STREAM_PATTERNS.iter().find_map(|re| {
        re.captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|url| {
                (url.starts_with("http://") || url.starts_with("https://"))
                    && url.len() > MIN_EMBED_URL_LEN
            })
    });
    if let Some(url) = stream {
        return Some(Embed::Stream(url.to_string()));
    }

    EMBED_PLAYER_SCRIPT
        .as_ref()
        .and_then(|re| re.captures(html)?.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| dailymotion::extract_video_id(html))
        .map(Embed::DailymotionId)
}

/// Resolve protocol-relative and relative links against the page URL
pub fn absolutize(link: &str, page_url: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    if let Some(rest) = link.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    Url::parse(page_url)
        .and_then(|base| base.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}
