//! Feed fetching, parsing and crawl scheduling.
//!
//! - [`fetcher`] - bounded HTTP GET returning status, headers and a capped body
//! - [`parser`] - RSS/Atom/JSON Feed parsing through `feed-rs`
//! - [`cache_control`] - cool-down computation from `Cache-Control`
//! - [`crawler`] - per-cycle refresh of ready feeds and first-time registration

mod cache_control;
mod crawler;
mod fetcher;
mod parser;

pub use cache_control::{calculate_not_until, DEFAULT_CACHE_SECS};
pub use crawler::{CrawlReport, CrawlSettings, Crawler};
pub use fetcher::{build_client, fetch, FeedResponse, FetchError};
pub use parser::{parse_feed, FeedItem, ParseError};
