//! dhua - stream resolution and speculative caching for episodic video
//!
//! Turns donghua episode pages into playable stream URLs, remembers the
//! results in a bounded LRU cache and resolves upcoming episodes in the
//! background while the current one plays.
//!
//! # Modules
//!
//! - `models` - Sources, episodes (with ordinal extraction) and resolutions
//! - `api` - Page fetching, site scraping and the Dailymotion metadata client
//! - `stream` - Resolution cascade, stream cache, preloader, session and player
//! - `config` - TOML configuration
//! - `cli` - Command-line definitions and output helpers

pub mod api;
pub mod cli;
pub mod config;
pub mod models;
pub mod stream;

// Re-export commonly used types
pub use models::{Episode, Resolution, SearchResult, Source, Tier, UNRESOLVED_ORDINAL};

pub use api::{DailymotionClient, HttpFetcher, PageFetcher, SiteClient};
pub use config::Config;
pub use stream::{
    Cascade, CascadeSettings, ExternalResolver, Preloader, Session, StreamCache, StreamResolver,
    YtDlp,
};
