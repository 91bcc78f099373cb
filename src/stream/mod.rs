//! Stream resolution and playback
//!
//! - cascade: four-tier episode page → stream URL resolution
//! - cache: persistent LRU of resolved streams
//! - preload: background resolution of upcoming episodes
//! - session: sequential playback over an episode list
//! - ytdlp: external resolver fallback
//! - player: mpv/VLC launching

pub mod cache;
pub mod cascade;
pub mod player;
pub mod preload;
pub mod session;
pub mod ytdlp;

pub use cache::{CacheError, StreamCache};
pub use cascade::{Cascade, CascadeSettings, StreamResolver};
pub use player::{LocalPlayer, PlayRequest, PlayerError, PlayerType};
pub use preload::{PendingFetch, PreloadState, Preloader};
pub use session::{Playback, Session};
pub use ytdlp::{ExternalResolver, ResolverError, YtDlp};
