//! Background preloading
//!
//! While one episode plays, the next few are resolved in a background task
//! and written into the shared [`StreamCache`], so moving on is a cache hit.
//!
//! At most one job runs at a time. Arming a new job cancels the previous one
//! and waits (bounded) for it to stop before the new one is spawned, so a
//! stale job never writes into the cache after a newer job has started.
//! Work the old job finished before cancellation is kept.
//!
//! A foreground fetch for the episode the job is resolving right now takes
//! over that lookup instead of starting a second one; cancelling the job no
//! longer aborts it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::StreamCache;
use super::cascade::StreamResolver;
use crate::models::{Episode, Resolution, Tier};

/// Episodes resolved ahead of the current one
pub const DEFAULT_WINDOW: usize = 2;

/// How long `arm` waits for a cancelled job to wind down
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of the most recent preload job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl fmt::Display for PreloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadState::Idle => write!(f, "idle"),
            PreloadState::Running => write!(f, "running"),
            PreloadState::Completed => write!(f, "completed"),
            PreloadState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The target a job is resolving right now
struct InFlight {
    reference: String,
    result: watch::Receiver<Option<Resolution>>,
    task: JoinHandle<()>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type InFlightSlot = Arc<Mutex<Option<InFlight>>>;

/// A cache-first lookup prepared by [`Preloader::begin_fetch`]
pub struct PendingFetch {
    reference: String,
    cache: Arc<StreamCache>,
    resolver: Arc<dyn StreamResolver>,
    source: FetchSource,
}

enum FetchSource {
    Cached(String),
    Adopted(InFlight),
    Fresh,
}

impl PendingFetch {
    /// True when the lookup took over a running preload
    pub fn is_adopted(&self) -> bool {
        matches!(self.source, FetchSource::Adopted(_))
    }

    /// Finish the lookup, caching a resolved stream
    pub async fn resolve(self) -> Resolution {
        let PendingFetch {
            reference,
            cache,
            resolver,
            source,
        } = self;

        let resolution = match source {
            FetchSource::Cached(url) => {
                return Resolution::Resolved {
                    url,
                    tier: Tier::Cache,
                }
            }
            FetchSource::Adopted(mut in_flight) => match wait_for(&mut in_flight.result).await {
                Some(resolution) => resolution,
                None => {
                    debug!(reference = %reference, "adopted preload failed, resolving again");
                    resolver.resolve(&reference).await
                }
            },
            FetchSource::Fresh => resolver.resolve(&reference).await,
        };

        if let Resolution::Resolved { url, .. } = &resolution {
            cache.put(reference, url.clone());
        }
        resolution
    }
}

/// Wait until a target task publishes its result; `None` if it died first
async fn wait_for(result: &mut watch::Receiver<Option<Resolution>>) -> Option<Resolution> {
    loop {
        let current = result.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if result.changed().await.is_err() {
            return result.borrow().clone();
        }
    }
}

struct PreloadJob {
    targets: Vec<String>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    state: Arc<Mutex<PreloadState>>,
}

/// Resolves upcoming episodes in the background
pub struct Preloader {
    cache: Arc<StreamCache>,
    resolver: Arc<dyn StreamResolver>,
    window: usize,
    join_timeout: Duration,
    job: Mutex<Option<PreloadJob>>,
    in_flight: InFlightSlot,
    arm_lock: tokio::sync::Mutex<()>,
}

impl Preloader {
    pub fn new(cache: Arc<StreamCache>, resolver: Arc<dyn StreamResolver>) -> Self {
        Self {
            cache,
            resolver,
            window: DEFAULT_WINDOW,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            job: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(None)),
            arm_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Set how many upcoming episodes are preloaded
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Set the bounded wait used when cancelling a job
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<StreamCache> {
        &self.cache
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// State of the most recent job
    pub fn state(&self) -> PreloadState {
        self.job
            .lock()
            .as_ref()
            .map(|job| *job.state.lock())
            .unwrap_or(PreloadState::Idle)
    }

    /// References targeted by the most recent job
    pub fn current_targets(&self) -> Vec<String> {
        self.job
            .lock()
            .as_ref()
            .map(|job| job.targets.clone())
            .unwrap_or_default()
    }

    /// Upcoming references after `current` that still need resolving
    pub fn targets(&self, episodes: &[Episode], current: usize) -> Vec<String> {
        episodes
            .iter()
            .skip(current.saturating_add(1))
            .take(self.window)
            .map(|e| e.reference().to_string())
            .filter(|r| !self.cache.contains(r))
            .collect()
    }

    /// Reference the running job is resolving right now
    pub fn in_flight(&self) -> Option<String> {
        self.in_flight.lock().as_ref().map(|f| f.reference.clone())
    }

    /// Cache-first stream lookup; resolves and caches on a miss.
    ///
    /// Hits are reported with [`Tier::Cache`]. A miss on the reference the
    /// preloader is resolving at this moment waits for that lookup.
    pub async fn fetch(&self, reference: &str) -> Resolution {
        self.begin_fetch(reference).resolve().await
    }

    /// Decide synchronously how `reference` will be looked up.
    ///
    /// Taking over an in-flight target happens here, so a following `arm`
    /// can no longer cancel it.
    pub fn begin_fetch(&self, reference: &str) -> PendingFetch {
        let source = if let Some(url) = self.cache.get(reference) {
            debug!(reference, "stream cache hit");
            FetchSource::Cached(url)
        } else {
            let mut slot = self.in_flight.lock();
            if slot.as_ref().is_some_and(|f| f.reference == reference) {
                debug!(reference, "joining in-flight preload");
                slot.take().map_or(FetchSource::Fresh, FetchSource::Adopted)
            } else {
                FetchSource::Fresh
            }
        };

        PendingFetch {
            reference: reference.to_string(),
            cache: self.cache.clone(),
            resolver: self.resolver.clone(),
            source,
        }
    }

    /// Re-target preloading at the episodes following `current`.
    ///
    /// Cancels any running job first. Returns the references the new job
    /// will resolve (empty when nothing needs preloading).
    pub async fn arm(&self, episodes: &[Episode], current: usize) -> Vec<String> {
        let _guard = self.arm_lock.lock().await;

        self.cancel_current().await;

        let targets = self.targets(episodes, current);
        if targets.is_empty() {
            debug!(current, "nothing to preload");
            return targets;
        }

        info!(current, targets = targets.len(), "preloading upcoming episodes");

        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(PreloadState::Running));
        let handle = tokio::spawn(run_job(
            targets.clone(),
            self.cache.clone(),
            self.resolver.clone(),
            self.in_flight.clone(),
            token.clone(),
            state.clone(),
        ));

        *self.job.lock() = Some(PreloadJob {
            targets: targets.clone(),
            token,
            handle: Some(handle),
            state,
        });
        targets
    }

    /// Cancel the running job, if any, and wait for it to stop
    pub async fn stop(&self) {
        let _guard = self.arm_lock.lock().await;
        self.cancel_current().await;
    }

    /// Wait for the current job to finish on its own
    pub async fn join(&self) {
        let handle = self.job.lock().as_mut().and_then(|job| job.handle.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "preload task failed");
            }
        }
    }

    async fn cancel_current(&self) {
        let (token, handle, state) = {
            let mut slot = self.job.lock();
            match slot.as_mut() {
                Some(job) => (job.token.clone(), job.handle.take(), job.state.clone()),
                None => return,
            }
        };

        token.cancel();

        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.join_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("preload task did not stop in time, aborting");
                handle.abort();
            }
        }
        // An aborted job leaves its target behind
        self.in_flight.lock().take();

        let mut state = state.lock();
        if *state == PreloadState::Running {
            *state = PreloadState::Cancelled;
        }
    }
}

async fn run_job(
    targets: Vec<String>,
    cache: Arc<StreamCache>,
    resolver: Arc<dyn StreamResolver>,
    in_flight: InFlightSlot,
    token: CancellationToken,
    state: Arc<Mutex<PreloadState>>,
) {
    for reference in targets {
        if token.is_cancelled() {
            break;
        }
        if cache.contains(&reference) {
            continue;
        }

        // Each target runs in its own task so a panic stays contained
        let (tx, mut result) = watch::channel(None);
        let task = tokio::spawn({
            let resolver = resolver.clone();
            let reference = reference.clone();
            async move {
                let resolution = resolver.resolve(&reference).await;
                tx.send_replace(Some(resolution));
            }
        });
        *in_flight.lock() = Some(InFlight {
            reference: reference.clone(),
            result: result.clone(),
            task,
        });

        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => {
                // aborts the target unless a foreground fetch adopted it
                in_flight.lock().take();
                break;
            }
            joined = wait_for(&mut result) => joined,
        };
        in_flight.lock().take();

        if token.is_cancelled() {
            break;
        }

        match joined {
            Some(Resolution::Resolved { url, tier }) => {
                debug!(reference = %reference, %tier, "preloaded");
                cache.put(reference, url);
            }
            Some(Resolution::Unresolved { .. }) => {
                debug!(reference = %reference, "preload could not resolve");
            }
            None => {
                warn!(reference = %reference, "preload target failed");
            }
        }
    }

    *state.lock() = if token.is_cancelled() {
        PreloadState::Cancelled
    } else {
        PreloadState::Completed
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoResolver;

    #[async_trait]
    impl StreamResolver for EchoResolver {
        async fn resolve(&self, reference: &str) -> Resolution {
            Resolution::Resolved {
                url: format!("{}.m3u8", reference),
                tier: Tier::Partial,
            }
        }
    }

    fn episodes(n: usize) -> Vec<Episode> {
        (1..=n)
            .map(|i| Episode::new(format!("Episode {}", i), format!("ep{}", i)).unwrap())
            .collect()
    }

    fn preloader() -> Preloader {
        Preloader::new(Arc::new(StreamCache::in_memory(10)), Arc::new(EchoResolver))
    }

    #[test]
    fn test_targets_window_and_bounds() {
        let p = preloader();
        let eps = episodes(4);
        assert_eq!(p.targets(&eps, 0), vec!["ep2", "ep3"]);
        assert_eq!(p.targets(&eps, 2), vec!["ep4"]);
        assert!(p.targets(&eps, 3).is_empty());
        assert!(p.targets(&eps, 99).is_empty());
    }

    #[test]
    fn test_targets_skip_cached() {
        let p = preloader();
        p.cache().put("ep2", "cached");
        assert_eq!(p.targets(&episodes(4), 0), vec!["ep3"]);
    }

    #[test]
    fn test_state_idle_before_arm() {
        assert_eq!(preloader().state(), PreloadState::Idle);
    }

    #[tokio::test]
    async fn test_arm_with_no_targets_stays_idle() {
        let p = preloader();
        assert!(p.arm(&episodes(1), 0).await.is_empty());
        assert_eq!(p.state(), PreloadState::Idle);
    }

    #[tokio::test]
    async fn test_fetch_reports_cache_hit() {
        let p = preloader();
        let first = p.fetch("ep1").await;
        assert_eq!(first.tier(), Some(Tier::Partial));
        let second = p.fetch("ep1").await;
        assert_eq!(second.tier(), Some(Tier::Cache));
        assert_eq!(second.url(), "ep1.m3u8");
    }
}
