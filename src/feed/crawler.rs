use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use url::Url;

use super::cache_control::{calculate_not_until, DEFAULT_CACHE_SECS};
use super::fetcher::fetch;
use super::parser::{parse_feed, FeedItem};
use crate::error::Error;
use crate::storage::{Database, DatabaseError, Feed};

/// Feeds fetched concurrently within one crawl cycle.
const MAX_CONCURRENT_FETCHES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct CrawlSettings {
    /// Bound on one feed request, body included
    pub timeout: Duration,
    /// Ceiling for cache-control derived cool-downs
    pub default_cache_secs: i64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            default_cache_secs: DEFAULT_CACHE_SECS,
        }
    }
}

/// Outcome of one crawl cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    /// Feeds whose cool-down had elapsed
    pub ready: usize,
    /// Feeds that errored (transport, HTTP status, body, parse or store)
    pub failed: usize,
    /// Articles newly stored across all feeds
    pub inserted: usize,
}

/// Fetches ready feeds and ingests their new items into the article store.
#[derive(Clone)]
pub struct Crawler {
    db: Database,
    client: reqwest::Client,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(db: Database, client: reqwest::Client, settings: CrawlSettings) -> Self {
        Self {
            db,
            client,
            settings,
        }
    }

    /// Refresh every feed whose cool-down elapsed at `now`.
    ///
    /// Errors are isolated per feed; only failing to list ready feeds aborts
    /// the cycle.
    pub async fn refresh_ready(&self, now: DateTime<Utc>) -> Result<CrawlReport, Error> {
        let feeds = self.db.list_ready_feeds(now).await?;
        let mut report = CrawlReport {
            ready: feeds.len(),
            ..CrawlReport::default()
        };

        if feeds.is_empty() {
            tracing::debug!("No feeds ready to crawl");
            return Ok(report);
        }

        let results: Vec<(i64, Result<usize, Error>)> = stream::iter(feeds)
            .map(|feed| async move {
                let feed_id = feed.id;
                (feed_id, self.refresh_one(feed, now).await)
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        for (feed_id, result) in results {
            match result {
                Ok(inserted) => report.inserted += inserted,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(feed_id = feed_id, error = %e, "Feed refresh failed");
                }
            }
        }

        tracing::info!(
            ready = report.ready,
            failed = report.failed,
            inserted = report.inserted,
            "Crawl cycle finished"
        );
        Ok(report)
    }

    async fn refresh_one(&self, mut feed: Feed, now: DateTime<Utc>) -> Result<usize, Error> {
        // No response at all: nothing is persisted, the feed stays ready
        let response = fetch(&self.client, &feed.link, self.settings.timeout).await?;

        // Any response resets the cool-down, error statuses and unreadable
        // bodies included
        feed.not_until =
            calculate_not_until(&response.headers, now, self.settings.default_cache_secs);
        self.db.update_feed(&feed).await?;

        if !response.is_success() {
            return Err(Error::Http {
                status: response.status.as_u16(),
            });
        }

        let body = response.body?;
        let items = parse_feed(&body)?;

        let floor = match self.db.latest_article(feed.id).await {
            Ok(latest) => Some(latest.published),
            Err(DatabaseError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(self.ingest(feed.id, items, floor).await)
    }

    /// Fetch a link that is not yet registered, store it and backfill every
    /// dated item.
    ///
    /// A concurrent registration of the same link is resolved by returning
    /// the row that won.
    pub async fn register(&self, link: &Url, now: DateTime<Utc>) -> Result<Feed, Error> {
        let response = fetch(&self.client, link.as_str(), self.settings.timeout).await?;
        if !response.is_success() {
            return Err(Error::Http {
                status: response.status.as_u16(),
            });
        }

        let body = response.body?;
        let items = parse_feed(&body)?;
        let not_until =
            calculate_not_until(&response.headers, now, self.settings.default_cache_secs);

        let feed = match self.db.create_feed(link, not_until).await {
            Ok(feed) => feed,
            Err(DatabaseError::AlreadyExists) => {
                tracing::debug!(link = %link, "Feed registered concurrently, reusing it");
                self.db.get_feed_by_link(link.as_str()).await?
            }
            Err(e) => return Err(e.into()),
        };

        let inserted = self.ingest(feed.id, items, None).await;
        tracing::info!(feed_id = feed.id, link = %link, inserted = inserted, "Registered feed");
        Ok(feed)
    }

    /// Store items published strictly after `floor` (all dated items when
    /// `None`), oldest first. Returns how many were new.
    ///
    /// Store errors are logged per item and never abort the batch.
    pub(crate) async fn ingest(
        &self,
        feed_id: i64,
        mut items: Vec<FeedItem>,
        floor: Option<DateTime<Utc>>,
    ) -> usize {
        items.sort_by_key(|item| item.published);

        let mut inserted = 0;
        for item in items {
            let Some(published) = item.published else {
                tracing::debug!(feed_id = feed_id, title = %item.title, "Skipping undated item");
                continue;
            };
            if floor.is_some_and(|floor| published <= floor) {
                continue;
            }
            let Some(link) = item.link.as_deref().and_then(|l| Url::parse(l).ok()) else {
                tracing::debug!(feed_id = feed_id, title = %item.title, "Skipping item without a valid link");
                continue;
            };

            match self
                .db
                .create_article(feed_id, &item.title, &link, published)
                .await
            {
                Ok(_) => inserted += 1,
                Err(DatabaseError::AlreadyExists) => {}
                Err(e) => {
                    tracing::warn!(feed_id = feed_id, link = %link, error = %e, "Failed to store article");
                }
            }
        }
        inserted
    }
}
