//! Configuration management for dhua
//!
//! Handles config file loading/saving.
//! Config is stored at ~/.config/dhua/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::api::fetcher::DEFAULT_USER_AGENT;
use crate::models::Source;
use crate::stream::cache::DEFAULT_CAPACITY;
use crate::stream::cascade::CascadeSettings;
use crate::stream::player::PlayerType;
use crate::stream::preload::DEFAULT_WINDOW;

/// Per-tier network timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Partial page scan
    pub partial: u64,
    /// Full page fetch
    pub full: u64,
    /// Video host metadata lookup
    pub metadata: u64,
    /// Iframe player page
    pub embed: u64,
    /// External resolver
    pub external: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            partial: 5,
            full: 8,
            metadata: 10,
            embed: 10,
            external: 15,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of cached stream URLs
    pub cache_capacity: usize,
    /// Stream cache file (defaults to the user cache dir)
    pub cache_path: Option<PathBuf>,
    /// Episodes resolved ahead of the current one
    pub preload_window: usize,
    /// Preferred maximum video height (360, 480, 720, 1080)
    pub quality: String,
    pub user_agent: String,
    /// Player name ("mpv" or "vlc")
    pub player: String,
    /// Default source site code ("ld" or "ax")
    pub source: Source,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            cache_path: None,
            preload_window: DEFAULT_WINDOW,
            quality: "720".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            player: "mpv".to_string(),
            source: Source::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Get config file path (~/.config/dhua/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dhua").join("config.toml"))
    }

    /// Default stream cache location (~/.cache/dhua/stream_cache.json)
    pub fn default_cache_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("dhua")
            .join("stream_cache.json")
    }

    /// Load config from the default location, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from a specific file; missing or invalid files yield defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match Self::parse(&text) {
            Ok(config) => config,
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(path = %path.display(), %error, "ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Parse config from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid config file")
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Resolved stream cache location
    pub fn cache_file(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(Self::default_cache_path)
    }

    /// Configured player, falling back to mpv for unknown names
    pub fn player_type(&self) -> PlayerType {
        PlayerType::from_name(&self.player).unwrap_or_default()
    }

    /// Cascade budgets derived from this config
    pub fn cascade_settings(&self) -> CascadeSettings {
        CascadeSettings {
            partial_timeout: Duration::from_secs(self.timeouts.partial),
            full_timeout: Duration::from_secs(self.timeouts.full),
            metadata_timeout: Duration::from_secs(self.timeouts.metadata),
            embed_timeout: Duration::from_secs(self.timeouts.embed),
            external_timeout: Duration::from_secs(self.timeouts.external),
            user_agent: self.user_agent.clone(),
            ..CascadeSettings::default()
        }
    }
}
