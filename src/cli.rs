//! CLI - Command Line Interface for dhua
//!
//! Every command is scriptable. With `--json` (or when stdout is not a
//! terminal) results are printed inside a JSON envelope.
//!
//! # Examples
//!
//! ```bash
//! # Find a series and list its episodes
//! dhua search "battle through the heavens"
//! dhua episodes https://luciferdonghua.in/anime/btth/
//!
//! # Resolve a single episode page
//! dhua resolve https://luciferdonghua.in/btth-episode-12/ --json
//!
//! # Watch from episode 5 with preloading
//! dhua play https://luciferdonghua.in/anime/btth/ --start 5
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::Source;
use crate::stream::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Series has no episodes
    NoEpisodes = 4,
    /// No stream could be resolved
    Unresolved = 5,
    /// Player failed to start
    PlayerFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// dhua - donghua streaming from the terminal
#[derive(Parser, Debug)]
#[command(
    name = "dhua",
    version,
    about = "Search, resolve and play donghua episodes",
    long_about = "Finds series on donghua sites, resolves episode pages to \
                  playable streams and plays them in mpv or VLC.\n\n\
                  Resolved streams are cached and the next episodes are \
                  resolved in the background while you watch.",
    after_help = "EXAMPLES:\n\
                  dhua search \"soul land\"             Search the default site\n\
                  dhua episodes <series-url>           List episodes in order\n\
                  dhua resolve <episode-url> --json    Resolve one episode\n\
                  dhua play <series-url> --start 12    Watch from episode 12"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search a source site for a series
    #[command(visible_alias = "s")]
    Search(SearchCmd),

    /// List a series' episodes in order
    #[command(visible_alias = "ep")]
    Episodes(EpisodesCmd),

    /// Resolve an episode page to a stream URL
    #[command(visible_alias = "r")]
    Resolve(ResolveCmd),

    /// Play a series interactively with background preloading
    #[command(visible_alias = "p")]
    Play(PlayCmd),

    /// Inspect or clear the stream cache
    Cache(CacheCmd),
}

/// Source site selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChoice {
    /// luciferdonghua.in
    Ld,
    /// animexin.dev
    Ax,
}

impl From<SourceChoice> for Source {
    fn from(choice: SourceChoice) -> Self {
        match choice {
            SourceChoice::Ld => Source::Lucifer,
            SourceChoice::Ax => Source::AnimeXin,
        }
    }
}

/// Local player selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerChoice {
    /// mpv media player
    Mpv,
    /// VLC media player
    Vlc,
}

impl From<PlayerChoice> for PlayerType {
    fn from(choice: PlayerChoice) -> Self {
        match choice {
            PlayerChoice::Mpv => PlayerType::Mpv,
            PlayerChoice::Vlc => PlayerType::Vlc,
        }
    }
}

// =============================================================================
// Search / Episodes
// =============================================================================

/// Search for a series by name
#[derive(Args, Debug)]
pub struct SearchCmd {
    /// Search query
    #[arg(required = true)]
    pub query: String,

    /// Source site (defaults to config)
    #[arg(long, short = 's', value_enum)]
    pub source: Option<SourceChoice>,

    /// Maximum number of results
    #[arg(long, short = 'l', default_value = "15")]
    pub limit: usize,
}

/// List the episodes of a series page
#[derive(Args, Debug)]
pub struct EpisodesCmd {
    /// Series page URL
    #[arg(required = true)]
    pub url: String,

    /// Source site (defaults to config)
    #[arg(long, short = 's', value_enum)]
    pub source: Option<SourceChoice>,
}

// =============================================================================
// Resolve
// =============================================================================

/// Resolve an episode page to a playable stream
#[derive(Args, Debug)]
pub struct ResolveCmd {
    /// Episode page URL
    #[arg(required = true)]
    pub url: String,

    /// Skip the stream cache (neither read nor written)
    #[arg(long)]
    pub no_cache: bool,
}

// =============================================================================
// Play
// =============================================================================

/// Play a series starting at an episode
#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Series page URL
    #[arg(required = true)]
    pub url: String,

    /// Episode number to start from (by ordinal, else by position)
    #[arg(long, short = 'e', default_value = "1")]
    pub start: u32,

    /// Player to use (defaults to config)
    #[arg(long, short = 'p', value_enum)]
    pub player: Option<PlayerChoice>,

    /// Source site (defaults to config)
    #[arg(long, short = 's', value_enum)]
    pub source: Option<SourceChoice>,
}

// =============================================================================
// Cache
// =============================================================================

/// Stream cache maintenance
#[derive(Args, Debug)]
pub struct CacheCmd {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// List cached streams, least recently used first
    List,
    /// Remove every cached stream
    Clear,
    /// Print the cache file location
    Path,
}

// =============================================================================
// Interactive Commands
// =============================================================================

/// A command typed at the play prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Next,
    Prev,
    Replay,
    /// Jump to an episode number
    Select(u32),
    Quit,
    Unknown(String),
}

impl PromptCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("n"), None) | (Some("next"), None) => PromptCommand::Next,
            (Some("p"), None) | (Some("prev"), None) => PromptCommand::Prev,
            (Some("r"), None) | (Some("replay"), None) => PromptCommand::Replay,
            (Some("q"), None) | (Some("quit"), None) => PromptCommand::Quit,
            (Some("s"), Some(n)) => n
                .parse()
                .map(PromptCommand::Select)
                .unwrap_or_else(|_| PromptCommand::Unknown(line.to_string())),
            (Some(n), None) if n.chars().all(|c| c.is_ascii_digit()) => n
                .parse()
                .map(PromptCommand::Select)
                .unwrap_or_else(|_| PromptCommand::Unknown(line.to_string())),
            _ => PromptCommand::Unknown(line.to_string()),
        }
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Status OK response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data as JSON
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a human-readable line (stdout, text mode only)
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_command() {
        let cli = Cli::parse_from(["dhua", "search", "soul land", "-s", "ax"]);
        if let Command::Search(cmd) = cli.command {
            assert_eq!(cmd.query, "soul land");
            assert_eq!(cmd.source, Some(SourceChoice::Ax));
            assert_eq!(cmd.limit, 15);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["dhua", "--json", "--quiet", "-v", "cache", "list"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(cli.verbose);
        if let Command::Cache(cmd) = cli.command {
            assert_eq!(cmd.action, CacheAction::List);
        } else {
            panic!("Expected Cache command");
        }
    }

    #[test]
    fn test_play_options() {
        let cli = Cli::parse_from(["dhua", "play", "https://site/anime/x/", "--start", "7", "-p", "vlc"]);
        if let Command::Play(cmd) = cli.command {
            assert_eq!(cmd.start, 7);
            assert_eq!(cmd.player.map(PlayerType::from), Some(PlayerType::Vlc));
        } else {
            panic!("Expected Play command");
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["dhua"]).is_err());
    }

    #[test]
    fn test_prompt_parsing() {
        assert_eq!(PromptCommand::parse("n"), PromptCommand::Next);
        assert_eq!(PromptCommand::parse(" p "), PromptCommand::Prev);
        assert_eq!(PromptCommand::parse("r"), PromptCommand::Replay);
        assert_eq!(PromptCommand::parse("s 12"), PromptCommand::Select(12));
        assert_eq!(PromptCommand::parse("7"), PromptCommand::Select(7));
        assert_eq!(PromptCommand::parse("q"), PromptCommand::Quit);
        assert_eq!(
            PromptCommand::parse("s x"),
            PromptCommand::Unknown("s x".to_string())
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::NoEpisodes), 4);
        assert_eq!(i32::from(ExitCode::Unresolved), 5);
        assert_eq!(i32::from(ExitCode::PlayerFailed), 6);
    }
}
