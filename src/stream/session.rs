//! Playback session
//!
//! Owns the position in an episode list. Every play request resolves the
//! chosen episode (cache first) while the preloader is re-armed for the
//! episodes after it.

use serde::Serialize;

use super::player::PlayRequest;
use super::preload::Preloader;
use crate::models::{Episode, Resolution, Tier};

/// A resolved episode ready for the player
#[derive(Debug, Clone, Serialize)]
pub struct Playback {
    pub index: usize,
    pub episode: Episode,
    pub resolution: Resolution,
    /// References the preloader is now working on
    pub preloading: Vec<String>,
}

impl Playback {
    pub fn cache_hit(&self) -> bool {
        self.resolution.tier() == Some(Tier::Cache)
    }

    /// What the player gets. An unresolved episode hands over its page, which
    /// players with a site extractor can often still open.
    pub fn request(&self) -> PlayRequest<'_> {
        PlayRequest {
            stream_url: self.resolution.url(),
            title: self.episode.title(),
            referer: Some(self.episode.reference()),
        }
    }
}

/// Sequential playback over an ordered episode list
pub struct Session {
    episodes: Vec<Episode>,
    preloader: Preloader,
    position: Option<usize>,
}

impl Session {
    pub fn new(episodes: Vec<Episode>, preloader: Preloader) -> Self {
        Self {
            episodes,
            preloader,
            position: None,
        }
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn preloader(&self) -> &Preloader {
        &self.preloader
    }

    /// Index of the episode last played
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn has_next(&self) -> bool {
        self.position.map_or(!self.episodes.is_empty(), |p| p + 1 < self.episodes.len())
    }

    pub fn has_prev(&self) -> bool {
        self.position.is_some_and(|p| p > 0)
    }

    /// Resolve episode `index` and re-arm preloading behind it.
    ///
    /// The foreground lookup and the preloader hand-off run concurrently.
    /// If the preloader is already resolving `index`, that lookup is adopted
    /// before re-arming so it is not thrown away.
    /// Returns `None` when `index` is out of range.
    pub async fn play(&mut self, index: usize) -> Option<Playback> {
        let episode = self.episodes.get(index)?.clone();

        let lookup = self.preloader.begin_fetch(episode.reference());
        let (resolution, preloading) = tokio::join!(
            lookup.resolve(),
            self.preloader.arm(&self.episodes, index),
        );

        self.position = Some(index);
        Some(Playback {
            index,
            episode,
            resolution,
            preloading,
        })
    }

    pub async fn next(&mut self) -> Option<Playback> {
        let index = self.position.map_or(0, |p| p + 1);
        self.play(index).await
    }

    pub async fn prev(&mut self) -> Option<Playback> {
        let index = self.position?.checked_sub(1)?;
        self.play(index).await
    }

    /// Cancel background work
    pub async fn stop(&self) {
        self.preloader.stop().await;
    }
}
