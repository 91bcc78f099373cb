//! Integration tests for dhua
//!
//! Tests are organized by component:
//! - ordinal_test: Episode number extraction, sorting and dedupe
//! - cache_test: LRU stream cache and its storage file
//! - cascade_test: Resolution tiers, HTTP fetcher and Dailymotion client
//! - preload_test: Background preloading, cancellation and sessions
//! - site_test: Search and episode listing
//! - cli_test: Argument parsing and JSON output
//!
//! Shared test doubles live in `common/`.

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
