//! Local Player - mpv/VLC playback support
//!
//! Opens resolved streams in mpv or VLC. Many embed hosts check the referer,
//! so the episode page is passed along with every stream.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Supported local players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    /// mpv media player (default)
    #[default]
    Mpv,
    /// VLC media player
    Vlc,
}

impl PlayerType {
    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerType::Mpv => "mpv",
        }
    }

    /// Get a display name for this player
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }

    /// Parse from a config value
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mpv" => Some(PlayerType::Mpv),
            "vlc" => Some(PlayerType::Vlc),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Errors from local player operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
}

/// What to play
#[derive(Debug, Clone)]
pub struct PlayRequest<'a> {
    pub stream_url: &'a str,
    pub title: &'a str,
    /// Page the stream was found on
    pub referer: Option<&'a str>,
}

/// Local player for streaming content
pub struct LocalPlayer {
    player_type: PlayerType,
    /// Height cap handed to mpv's ytdl hook (e.g. "720")
    quality: String,
}

impl LocalPlayer {
    /// Create a new local player with the specified type
    pub fn new(player_type: PlayerType, quality: impl Into<String>) -> Self {
        Self {
            player_type,
            quality: quality.into(),
        }
    }

    /// Get the player type
    pub fn player_type(&self) -> PlayerType {
        self.player_type
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let cmd = self.player_type.command();

        // If it's a full path (macOS app bundle), check if it exists
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        // Otherwise use 'which' to find in PATH
        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Command-line arguments for a request
    pub fn args(&self, request: &PlayRequest<'_>) -> Vec<String> {
        let mut args = vec![request.stream_url.to_string()];

        match self.player_type {
            PlayerType::Mpv => {
                args.push(format!("--force-media-title={}", request.title));
                if let Some(referer) = request.referer {
                    args.push(format!("--referrer={}", referer));
                }
                args.push(format!(
                    "--ytdl-format=bestvideo[height<={q}]+bestaudio/best[height<={q}]/best",
                    q = self.quality
                ));
                args.push("--cache=yes".to_string());
                args.push("--cache-secs=60".to_string());
                args.push("--force-window=immediate".to_string());
            }
            PlayerType::Vlc => {
                if let Some(referer) = request.referer {
                    args.push(format!("--http-referrer={}", referer));
                }
                args.push(format!("--meta-title={}", request.title));
                args.push("--play-and-exit".to_string());
                args.push("--no-video-title-show".to_string());
            }
        }

        args
    }

    /// Launch the player; the returned child keeps running independently
    pub fn play(&self, request: &PlayRequest<'_>) -> Result<Child, PlayerError> {
        let mut cmd = Command::new(self.player_type.command());
        cmd.args(self.args(request));

        // Don't let player output fight with the prompt
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.player_type.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })
    }

    /// Terminate a running player, giving it a moment to exit
    pub async fn stop(child: &mut Child) {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        let _ = child.start_kill();
        let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
    }
}
