//! Network clients
//!
//! - fetcher: page retrieval (reqwest with curl fallback)
//! - dailymotion: player metadata and quality selection
//! - site: donghua site search and episode listing

pub mod dailymotion;
pub mod fetcher;
pub mod site;

pub use dailymotion::DailymotionClient;
pub use fetcher::{FetchError, HttpFetcher, PageFetcher};
pub use site::SiteClient;
