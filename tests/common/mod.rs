//! Shared test doubles: a scripted page fetcher, a scripted external
//! resolver and resolvers that are slow or fail on purpose.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dhua::api::fetcher::{FetchError, PageFetcher};
use dhua::models::{Episode, Resolution, Tier};
use dhua::stream::{ExternalResolver, ResolverError, StreamResolver};

// =============================================================================
// Page Fetcher
// =============================================================================

/// Serves canned bodies by URL and records every request
#[derive(Default)]
pub struct ScriptedFetcher {
    prefixes: HashMap<String, String>,
    pages: HashMap<String, String>,
    prefix_log: Mutex<Vec<String>>,
    fetch_log: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body returned by `fetch_prefix` for `url`
    pub fn with_prefix(mut self, url: &str, body: &str) -> Self {
        self.prefixes.insert(url.to_string(), body.to_string());
        self
    }

    /// Body returned by `fetch` for `url` (and by `fetch_prefix`, truncated,
    /// when no explicit prefix is set)
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn prefix_calls(&self) -> usize {
        self.prefix_log.lock().len()
    }

    /// URLs requested through `fetch`, in order
    pub fn fetched(&self) -> Vec<String> {
        self.fetch_log.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn referer_for(&self, url: &str) -> Option<String> {
        self.fetch_log
            .lock()
            .iter()
            .find(|(u, _)| u == url)
            .and_then(|(_, r)| r.clone())
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_prefix(
        &self,
        url: &str,
        limit: usize,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        self.prefix_log.lock().push(url.to_string());
        if let Some(body) = self.prefixes.get(url) {
            return Ok(body.clone());
        }
        match self.pages.get(url) {
            Some(body) => Ok(body.get(..limit).unwrap_or(body).to_string()),
            None => Err(FetchError::Status(404)),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        referer: Option<&str>,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        self.fetch_log
            .lock()
            .push((url.to_string(), referer.map(str::to_string)));
        self.pages
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

// =============================================================================
// External Resolver
// =============================================================================

/// Returns fixed output lines, or "not installed" when given none
#[derive(Default)]
pub struct ScriptedExternal {
    lines: Option<Vec<String>>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedExternal {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: Some(lines.iter().map(|l| l.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// (url, user_agent, referer) of the most recent call
    pub fn last_call(&self) -> Option<(String, String, String)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl ExternalResolver for ScriptedExternal {
    async fn resolve(
        &self,
        url: &str,
        user_agent: &str,
        referer: &str,
        _timeout: Duration,
    ) -> Result<Vec<String>, ResolverError> {
        self.calls
            .lock()
            .push((url.to_string(), user_agent.to_string(), referer.to_string()));
        self.lines
            .clone()
            .ok_or_else(|| ResolverError::NotFound("yt-dlp".to_string()))
    }
}

// =============================================================================
// Stream Resolvers
// =============================================================================

/// Resolves `ref` to `ref.m3u8` after a delay, counting calls per reference
pub struct SlowResolver {
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl SlowResolver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    pub fn calls_for(&self, reference: &str) -> usize {
        self.calls.lock().get(reference).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamResolver for SlowResolver {
    async fn resolve(&self, reference: &str) -> Resolution {
        *self.calls.lock().entry(reference.to_string()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Resolution::Resolved {
            url: format!("{}.m3u8", reference),
            tier: Tier::Partial,
        }
    }
}

/// Panics on one reference, leaves another unresolved, resolves the rest
pub struct FaultyResolver {
    pub panic_on: String,
    pub unresolved: String,
}

#[async_trait]
impl StreamResolver for FaultyResolver {
    async fn resolve(&self, reference: &str) -> Resolution {
        if reference == self.panic_on {
            panic!("resolver blew up on {}", reference);
        }
        if reference == self.unresolved {
            return Resolution::Unresolved {
                reference: reference.to_string(),
            };
        }
        Resolution::Resolved {
            url: format!("{}.m3u8", reference),
            tier: Tier::Structural,
        }
    }
}

/// Episodes named "Episode 1".."Episode n" with references "ep1".."epn"
pub fn episodes(n: usize) -> Vec<Episode> {
    (1..=n)
        .map(|i| Episode::new(format!("Episode {}", i), format!("ep{}", i)).unwrap())
        .collect()
}

/// Poll until `check` passes or two seconds elapse
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
