//! Feed polling and notification pipeline.
//!
//! Feeds are crawled on a cache-control driven cool-down, new items are stored
//! once per (feed, link), and every subscription is told about items published
//! after its watermark, one rate-limited message at a time.

pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod notify;
pub mod scheduler;
pub mod search;
pub mod service;
pub mod shutdown;
pub mod storage;
pub mod util;

pub use error::{Error, HttpCategory};
pub use service::{FeedService, ServiceSettings};
