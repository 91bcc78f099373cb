//! Donghua site client
//!
//! Searches a source site and lists a series' episodes. Episode lists are
//! sorted by ordinal and deduplicated before they reach the player.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::fetcher::PageFetcher;
use crate::models::{Episode, SearchResult, Source};

/// Maximum number of search results returned
pub const MAX_SEARCH_RESULTS: usize = 15;

/// Path segment every series page lives under
const SERIES_PATH: &str = "/anime/";

/// Text fragments that mark a link as an episode link
const EPISODE_INDICATORS: &[&str] = &["episode", "ep", "第", "集"];

/// Client for one source site
pub struct SiteClient {
    source: Source,
    base_url: String,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    episode_cache: Mutex<HashMap<String, Vec<Episode>>>,
}

impl SiteClient {
    /// Create a client for the given source
    pub fn new(source: Source, fetcher: Arc<dyn PageFetcher>, timeout: Duration) -> Self {
        Self::with_base_url(source, fetcher, timeout, source.base_url())
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(
        source: Source,
        fetcher: Arc<dyn PageFetcher>,
        timeout: Duration,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetcher,
            timeout,
            episode_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Search URL for a query
    pub fn search_url(&self, query: &str) -> String {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| urlencoding::encode(w).into_owned())
            .collect();
        format!("{}/?s={}", self.base_url, words.join("+"))
    }

    /// Search the site for a series
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = self.search_url(query);
        let html = self
            .fetcher
            .fetch(&url, None, self.timeout)
            .await
            .with_context(|| format!("Search request to {} failed", self.source.name()))?;

        let mut results = parse_search_results(&html, self.source.search_selector());
        results.truncate(MAX_SEARCH_RESULTS);
        debug!(query, count = results.len(), "search complete");
        Ok(results)
    }

    /// List a series' episodes (memoized per series URL)
    pub async fn episodes(&self, series_url: &str) -> Result<Vec<Episode>> {
        if let Some(cached) = self.episode_cache.lock().get(series_url) {
            return Ok(cached.clone());
        }

        let html = self
            .fetcher
            .fetch(series_url, None, self.timeout)
            .await
            .with_context(|| format!("Failed to fetch episode list from {}", series_url))?;

        let episodes = parse_episode_list(&html, self.source.episode_selectors());
        debug!(series_url, count = episodes.len(), "episode list parsed");

        self.episode_cache
            .lock()
            .insert(series_url.to_string(), episodes.clone());
        Ok(episodes)
    }
}

/// Extract search results: the first link of every result card.
///
/// Pages without any card fall back to every link on the page. Either way
/// only links into a series page (`/anime/`) count.
pub fn parse_search_results(html: &str, card_selector: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(cards), Ok(anchor)) = (Selector::parse(card_selector), Selector::parse("a[href]"))
    else {
        return Vec::new();
    };

    let mut links: Vec<_> = document
        .select(&cards)
        .filter_map(|card| card.select(&anchor).next())
        .collect();
    if document.select(&cards).next().is_none() {
        links = document.select(&anchor).collect();
    }

    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for link in links {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.contains(SERIES_PATH) || !seen.insert(href.to_string()) {
            continue;
        }

        let title = link
            .value()
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| collapse_whitespace(&link.text().collect::<String>()));

        results.push(SearchResult {
            title,
            url: href.to_string(),
        });
    }

    results
}

/// Extract, sort and deduplicate a series' episode links
pub fn parse_episode_list(html: &str, selectors: &[&str]) -> Vec<Episode> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut episodes = Vec::new();

    for selector in selectors {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for link in document.select(&selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !seen.insert(normalize_href(href)) {
                continue;
            }

            let title = collapse_whitespace(&link.text().collect::<String>());
            if !looks_like_episode(&title, href) {
                continue;
            }
            if let Ok(episode) = Episode::new(title, href) {
                episodes.push(episode);
            }
        }
    }

    Episode::sort_and_dedupe(episodes)
}

/// Strip trailing slash, query and fragment for duplicate detection
pub fn normalize_href(href: &str) -> String {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    href[..end].trim_end_matches('/').to_string()
}

fn looks_like_episode(title: &str, href: &str) -> bool {
    let title = title.to_lowercase();
    let href = href.to_lowercase();
    EPISODE_INDICATORS
        .iter()
        .any(|i| title.contains(i) || href.contains(i))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("https://s/ep-1/"), "https://s/ep-1");
        assert_eq!(normalize_href("https://s/ep-1/?ref=x#top"), "https://s/ep-1");
        assert_eq!(normalize_href("https://s/ep-1"), "https://s/ep-1");
    }

    #[test]
    fn test_looks_like_episode() {
        assert!(looks_like_episode("Episode 3", "https://s/x"));
        assert!(looks_like_episode("Three", "https://s/show-ep-3"));
        assert!(looks_like_episode("第3集", "https://s/x"));
        assert!(!looks_like_episode("Home", "https://s/home"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Episode\n  12 \t"), "Episode 12");
    }
}
