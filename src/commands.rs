//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the appropriate backend services.
//! Each handler takes CLI args, the loaded config and Output, returns ExitCode.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};

use dhua::api::{HttpFetcher, PageFetcher, SiteClient};
use dhua::cli::{
    CacheAction, CacheCmd, EpisodesCmd, ExitCode, Output, PlayCmd, PromptCommand, ResolveCmd,
    SearchCmd, SourceChoice, StatusOk,
};
use dhua::config::Config;
use dhua::models::{Episode, Resolution, Source};
use dhua::stream::{
    Cascade, LocalPlayer, Playback, PlayerError, PlayerType, Preloader, Session,
    StreamCache, StreamResolver, YtDlp,
};

// =============================================================================
// Wiring
// =============================================================================

fn fetcher(config: &Config) -> Arc<dyn PageFetcher> {
    Arc::new(HttpFetcher::with_user_agent(config.user_agent.clone()))
}

fn site_client(config: &Config, source: Option<SourceChoice>) -> SiteClient {
    let source = source.map(Source::from).unwrap_or(config.source);
    SiteClient::new(
        source,
        fetcher(config),
        Duration::from_secs(config.timeouts.full),
    )
}

fn cascade(config: &Config) -> Arc<dyn StreamResolver> {
    Arc::new(Cascade::new(
        fetcher(config),
        Arc::new(YtDlp::new()),
        config.cascade_settings(),
    ))
}

fn stream_cache(config: &Config) -> Arc<StreamCache> {
    Arc::new(StreamCache::open(config.cache_file(), config.cache_capacity))
}

fn preloader(config: &Config) -> Preloader {
    Preloader::new(stream_cache(config), cascade(config)).with_window(config.preload_window)
}

// =============================================================================
// Search / Episodes
// =============================================================================

pub async fn search_cmd(cmd: SearchCmd, config: &Config, output: &Output) -> ExitCode {
    let client = site_client(config, cmd.source);
    output.info(format!("Searching {} for: {}", client.source(), cmd.query));

    match client.search(&cmd.query).await {
        Ok(mut results) => {
            results.truncate(cmd.limit);
            if output.json {
                if let Err(e) = output.print(&results) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else if results.is_empty() {
                output.info("No results");
            } else {
                for (i, result) in results.iter().enumerate() {
                    output.line(format!("{:>2}. {}\n    {}", i + 1, result.title, result.url));
                }
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Search failed: {:#}", e), ExitCode::NetworkError),
    }
}

pub async fn episodes_cmd(cmd: EpisodesCmd, config: &Config, output: &Output) -> ExitCode {
    let client = site_client(config, cmd.source);
    output.info(format!("Fetching episodes from {}", cmd.url));

    match client.episodes(&cmd.url).await {
        Ok(episodes) if episodes.is_empty() => {
            output.error("No episodes found", ExitCode::NoEpisodes)
        }
        Ok(episodes) => {
            if output.json {
                if let Err(e) = output.print(&episodes) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else {
                for episode in &episodes {
                    output.line(episode);
                }
            }
            ExitCode::Success
        }
        Err(e) => output.error(
            format!("Episode listing failed: {:#}", e),
            ExitCode::NetworkError,
        ),
    }
}

// =============================================================================
// Resolve
// =============================================================================

#[derive(Debug, Serialize)]
struct ResolveResponse<'a> {
    reference: &'a str,
    #[serde(flatten)]
    resolution: &'a Resolution,
}

pub async fn resolve_cmd(cmd: ResolveCmd, config: &Config, output: &Output) -> ExitCode {
    output.info(format!("Resolving {}", cmd.url));

    let resolution = if cmd.no_cache {
        cascade(config).resolve(&cmd.url).await
    } else {
        preloader(config).fetch(&cmd.url).await
    };

    if output.json {
        let response = ResolveResponse {
            reference: &cmd.url,
            resolution: &resolution,
        };
        if let Err(e) = output.print(&response) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.line(resolution.url());
        if let Some(tier) = resolution.tier() {
            output.info(format!("Resolved via {}", tier));
        }
    }

    if resolution.is_resolved() {
        ExitCode::Success
    } else {
        output.error("No stream found on the page", ExitCode::Unresolved)
    }
}

// =============================================================================
// Play
// =============================================================================

/// Start position: the episode whose ordinal matches, else the n-th episode
fn start_index(episodes: &[Episode], start: u32) -> Option<usize> {
    episodes
        .iter()
        .position(|e| e.ordinal() == start)
        .or_else(|| {
            let index = (start as usize).checked_sub(1)?;
            (index < episodes.len()).then_some(index)
        })
}

fn launch(
    player: &LocalPlayer,
    playback: &Playback,
    output: &Output,
) -> Result<Child, PlayerError> {
    if !playback.resolution.is_resolved() {
        warn!(reference = playback.episode.reference(), "no stream found, passing the page to the player");
        output.info(format!(
            "No stream found for {}, letting the player try the page",
            playback.episode.title()
        ));
    }

    let source = if playback.cache_hit() { " (cached)" } else { "" };
    output.info(format!("▶ {}{}", playback.episode, source));
    if !playback.preloading.is_empty() {
        debug!(targets = ?playback.preloading, "preloading");
    }

    player.play(&playback.request())
}

pub async fn play_cmd(cmd: PlayCmd, config: &Config, output: &Output) -> ExitCode {
    let player_type = cmd.player.map(PlayerType::from).unwrap_or_else(|| config.player_type());
    let player = LocalPlayer::new(player_type, config.quality.clone());
    if !player.is_available().await {
        return output.error(
            PlayerError::NotFound(player_type.command().to_string()).to_string(),
            ExitCode::PlayerFailed,
        );
    }

    let client = site_client(config, cmd.source);
    let episodes = match client.episodes(&cmd.url).await {
        Ok(episodes) if episodes.is_empty() => {
            return output.error("No episodes found", ExitCode::NoEpisodes)
        }
        Ok(episodes) => episodes,
        Err(e) => {
            return output.error(
                format!("Episode listing failed: {:#}", e),
                ExitCode::NetworkError,
            )
        }
    };

    let Some(first) = start_index(&episodes, cmd.start) else {
        return output.error(
            format!("Episode {} not found ({} available)", cmd.start, episodes.len()),
            ExitCode::InvalidArgs,
        );
    };

    let mut session = Session::new(episodes, preloader(config));
    let mut current: Option<Child> = None;
    let mut exit = ExitCode::Success;

    let mut pending = session.play(first).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if let Some(playback) = pending.take() {
            if let Some(child) = current.as_mut() {
                LocalPlayer::stop(child).await;
            }
            current = match launch(&player, &playback, output) {
                Ok(child) => Some(child),
                Err(e) => {
                    exit = output.error(e.to_string(), ExitCode::PlayerFailed);
                    break;
                }
            };
        }

        output.info("[n]ext [p]rev [r]eplay [s N] select [q]uit");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                exit = output.error(format!("Failed to read input: {}", e), ExitCode::Error);
                break;
            }
        };

        pending = match PromptCommand::parse(&line) {
            PromptCommand::Next if session.has_next() => session.next().await,
            PromptCommand::Prev if session.has_prev() => session.prev().await,
            PromptCommand::Next | PromptCommand::Prev => {
                output.info("No episode there");
                None
            }
            PromptCommand::Replay => match session.position() {
                Some(index) => session.play(index).await,
                None => None,
            },
            PromptCommand::Select(number) => match start_index(session.episodes(), number) {
                Some(index) => session.play(index).await,
                None => {
                    output.info(format!("Episode {} not found", number));
                    None
                }
            },
            PromptCommand::Quit => break,
            PromptCommand::Unknown(other) => {
                if !other.is_empty() {
                    output.info(format!("Unknown command: {}", other));
                }
                None
            }
        };
    }

    session.stop().await;
    if let Some(child) = current.as_mut() {
        LocalPlayer::stop(child).await;
    }
    exit
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Serialize)]
struct CacheEntry {
    episode: String,
    stream: String,
}

pub async fn cache_cmd(cmd: CacheCmd, config: &Config, output: &Output) -> ExitCode {
    let path = config.cache_file();

    match cmd.action {
        CacheAction::Path => {
            if output.json {
                if let Err(e) = output.print(path.display().to_string()) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else {
                output.line(path.display());
            }
            ExitCode::Success
        }
        CacheAction::List => {
            let cache = StreamCache::open(&path, config.cache_capacity);
            let entries: Vec<CacheEntry> = cache
                .entries()
                .into_iter()
                .map(|(episode, stream)| CacheEntry { episode, stream })
                .collect();
            if output.json {
                if let Err(e) = output.print(&entries) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else if entries.is_empty() {
                output.info("Cache is empty");
            } else {
                for entry in &entries {
                    output.line(format!("{}\n  -> {}", entry.episode, entry.stream));
                }
            }
            ExitCode::Success
        }
        CacheAction::Clear => {
            let cache = StreamCache::open(&path, config.cache_capacity);
            let removed = cache.len();
            cache.clear();
            if let Err(e) = cache.save() {
                return output.error(format!("Failed to clear cache: {}", e), ExitCode::Error);
            }
            if output.json {
                if let Err(e) = output.print(StatusOk::default()) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else {
                output.info(format!("Removed {} cached streams", removed));
            }
            ExitCode::Success
        }
    }
}
