//! Data structures and types for dhua
//!
//! Contains the shared models used across the application organized by domain:
//! - **Catalog**: source sites, search results and episodes
//! - **Ordinals**: episode number extraction from noisy titles and URLs
//! - **Resolution**: the tagged outcome of turning an episode page into a stream

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Catalog Models
// =============================================================================

/// Supported donghua source sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Source {
    /// LuciferDonghua
    #[default]
    #[serde(rename = "ld")]
    Lucifer,
    /// AnimeXin
    #[serde(rename = "ax")]
    AnimeXin,
}

impl Source {
    /// Short code used on the command line and in config
    pub fn code(&self) -> &'static str {
        match self {
            Source::Lucifer => "ld",
            Source::AnimeXin => "ax",
        }
    }

    /// Human-readable site name
    pub fn name(&self) -> &'static str {
        match self {
            Source::Lucifer => "LuciferDonghua",
            Source::AnimeXin => "AnimeXin",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Source::Lucifer => "https://luciferdonghua.in",
            Source::AnimeXin => "https://animexin.dev",
        }
    }

    /// CSS selector for one search result card
    pub fn search_selector(&self) -> &'static str {
        match self {
            Source::Lucifer => "article.bs",
            Source::AnimeXin => "article",
        }
    }

    /// CSS selectors tried in order when listing episodes
    pub fn episode_selectors(&self) -> &'static [&'static str] {
        match self {
            Source::Lucifer => &[".eplister a", ".episodelist a", "#chapterlist a", "li a"],
            Source::AnimeXin => &[
                ".eplister a",
                ".episodelist a",
                "#chapterlist a",
                ".lstep a",
                "ul li a",
            ],
        }
    }

    /// Parse a source from its short code or name
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ld" | "lucifer" | "luciferdonghua" => Some(Source::Lucifer),
            "ax" | "animexin" => Some(Source::AnimeXin),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A series found by site search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

// =============================================================================
// Episodes
// =============================================================================

/// Ordinal assigned when no pattern matches; sorts after every real episode
pub const UNRESOLVED_ORDINAL: u32 = u32::MAX;

/// Ordinal patterns, most specific first. Looser patterns would otherwise pick
/// up resolutions or years embedded in free-text titles.
static ORDINAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)episode\s*-?\s*([0-9]+)",
        r"(?i)ep\s*-?\s*([0-9]+)",
        r"第\s*([0-9]+)\s*[集话]",
        r"([0-9]{2,})\s*$",
        r"\b([0-9]{2,})\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Errors constructing an [`Episode`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EpisodeError {
    #[error("Episode reference must not be empty")]
    EmptyReference,
}

/// A single playable episode.
///
/// Immutable once built; the ordinal is computed once from the title and
/// reference at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    title: String,
    reference: String,
    ordinal: u32,
}

impl Episode {
    /// Create an episode, deriving its ordinal
    pub fn new(title: impl Into<String>, reference: impl Into<String>) -> Result<Self, EpisodeError> {
        let title = title.into();
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(EpisodeError::EmptyReference);
        }
        let ordinal = Self::extract_ordinal(&title, &reference);
        Ok(Self {
            title,
            reference,
            ordinal,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Episode page URL
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Whether an ordinal could be derived at all
    pub fn has_ordinal(&self) -> bool {
        self.ordinal != UNRESOLVED_ORDINAL
    }

    /// Extract an episode number from a title, falling back to the URL.
    ///
    /// Every pattern is tried against the title before any is tried against
    /// the reference. Returns [`UNRESOLVED_ORDINAL`] when nothing matches.
    pub fn extract_ordinal(title: &str, reference: &str) -> u32 {
        Self::match_ordinal(title)
            .or_else(|| Self::match_ordinal(reference))
            .unwrap_or(UNRESOLVED_ORDINAL)
    }

    fn match_ordinal(text: &str) -> Option<u32> {
        ORDINAL_PATTERNS.iter().find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|n| *n != UNRESOLVED_ORDINAL)
        })
    }

    /// Sort by ordinal ascending (stable), then keep the first episode per ordinal
    pub fn sort_and_dedupe(mut episodes: Vec<Episode>) -> Vec<Episode> {
        episodes.sort_by_key(|e| e.ordinal);
        let mut seen = HashSet::new();
        episodes.retain(|e| seen.insert(e.ordinal));
        episodes
    }
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_ordinal() {
            write!(f, "{:03}. {}", self.ordinal, self.title)
        } else {
            write!(f, "  ?. {}", self.title)
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Cascade tier that produced a stream URL, in cost order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Reference already names a media container
    Direct,
    /// Pattern scan over the first few KiB of the page
    Partial,
    /// Full document parse
    Structural,
    /// External resolution utility
    External,
    /// Served from the stream cache
    Cache,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Direct => write!(f, "direct"),
            Tier::Partial => write!(f, "partial"),
            Tier::Structural => write!(f, "structural"),
            Tier::External => write!(f, "external"),
            Tier::Cache => write!(f, "cache"),
        }
    }
}

/// Outcome of resolving an episode reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Resolution {
    /// A stream URL was found
    Resolved { url: String, tier: Tier },
    /// Every tier was exhausted; the reference is handed back untouched
    Unresolved { reference: String },
}

impl Resolution {
    /// The address to hand to a player: the stream, or the original reference
    pub fn url(&self) -> &str {
        match self {
            Resolution::Resolved { url, .. } => url,
            Resolution::Unresolved { reference } => reference,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    pub fn tier(&self) -> Option<Tier> {
        match self {
            Resolution::Resolved { tier, .. } => Some(*tier),
            Resolution::Unresolved { .. } => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Resolved { url, tier } => write!(f, "{} [{}]", url, tier),
            Resolution::Unresolved { reference } => write!(f, "{} [unresolved]", reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Source Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_source_codes() {
        assert_eq!(Source::from_code("ld"), Some(Source::Lucifer));
        assert_eq!(Source::from_code(" AX "), Some(Source::AnimeXin));
        assert_eq!(Source::from_code("nope"), None);
        assert_eq!(Source::default(), Source::Lucifer);
    }

    #[test]
    fn test_source_serde() {
        let json = serde_json::to_string(&Source::AnimeXin).unwrap();
        assert_eq!(json, "\"ax\"");
        let parsed: Source = serde_json::from_str("\"ld\"").unwrap();
        assert_eq!(parsed, Source::Lucifer);
    }

    // -------------------------------------------------------------------------
    // Episode Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_episode_rejects_empty_reference() {
        assert_eq!(Episode::new("Ep 1", "  "), Err(EpisodeError::EmptyReference));
    }

    #[test]
    fn test_episode_ordinal_computed_once() {
        let ep = Episode::new("Episode 7", "https://site/ep-7").unwrap();
        assert_eq!(ep.ordinal(), 7);
        assert!(ep.has_ordinal());
    }

    #[test]
    fn test_ordinal_ep_dash_form() {
        assert_eq!(Episode::extract_ordinal("Renegade Immortal EP-104", ""), 104);
    }

    #[test]
    fn test_ordinal_prefers_episode_marker_over_resolution() {
        assert_eq!(Episode::extract_ordinal("1080p Episode 3", ""), 3);
    }

    #[test]
    fn test_ordinal_trailing_number_before_bare() {
        assert_eq!(Episode::extract_ordinal("Season 2019 Part 15", ""), 15);
    }

    #[test]
    fn test_ordinal_overflow_falls_through() {
        // Too large for u32 on every pattern: unknown
        assert_eq!(
            Episode::extract_ordinal("Episode 99999999999999", ""),
            UNRESOLVED_ORDINAL
        );
    }

    #[test]
    fn test_display_unknown_ordinal() {
        let ep = Episode::new("Special", "https://site/special").unwrap();
        assert_eq!(ep.to_string(), "  ?. Special");
    }

    // -------------------------------------------------------------------------
    // Resolution Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolution_url() {
        let ok = Resolution::Resolved {
            url: "https://cdn/x.m3u8".to_string(),
            tier: Tier::Partial,
        };
        assert_eq!(ok.url(), "https://cdn/x.m3u8");
        assert_eq!(ok.tier(), Some(Tier::Partial));

        let miss = Resolution::Unresolved {
            reference: "https://site/ep-1".to_string(),
        };
        assert_eq!(miss.url(), "https://site/ep-1");
        assert!(!miss.is_resolved());
    }

    #[test]
    fn test_resolution_serde_tagged() {
        let ok = Resolution::Resolved {
            url: "u".to_string(),
            tier: Tier::External,
        };
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"status":"resolved","url":"u","tier":"external"}"#);
    }
}
