use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::Error;
use crate::feed::{CrawlReport, CrawlSettings, Crawler};
use crate::notify::{Delivery, Notifier, NotifyReport, RateGate};
use crate::search::{CollectionSearchCache, DEFAULT_MAX_RESULTS, DEFAULT_TTL};
use crate::shutdown::ShutdownSignal;
use crate::storage::{Database, DatabaseError, Subscription};

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub crawl: CrawlSettings,
    pub rate_interval: Duration,
    pub autocomplete_ttl: Duration,
    pub autocomplete_max_results: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            crawl: CrawlSettings::default(),
            rate_interval: Duration::from_secs(1),
            autocomplete_ttl: DEFAULT_TTL,
            autocomplete_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Entry point for every operation: subscription commands, autocomplete and
/// the two background cycles.
pub struct FeedService {
    db: Database,
    crawler: Crawler,
    notifier: Notifier,
    gate: Arc<RateGate>,
    completions: CollectionSearchCache<Database>,
}

impl FeedService {
    pub fn new(
        db: Database,
        client: reqwest::Client,
        delivery: Arc<dyn Delivery>,
        settings: ServiceSettings,
    ) -> Self {
        let gate = Arc::new(RateGate::new(settings.rate_interval));
        Self {
            crawler: Crawler::new(db.clone(), client, settings.crawl),
            notifier: Notifier::new(db.clone(), delivery, gate.clone()),
            completions: CollectionSearchCache::new(
                db.clone(),
                settings.autocomplete_ttl,
                settings.autocomplete_max_results,
            ),
            gate,
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn crawler(&self) -> &Crawler {
        &self.crawler
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Subscribe `collection_name` on `server_id` to `link`.
    ///
    /// An unknown link is fetched, validated as a feed and backfilled first.
    /// The new subscription's watermark is the current time, so only items
    /// published from now on are announced.
    pub async fn subscribe(
        &self,
        link: &Url,
        server_id: &str,
        channel_id: &str,
        collection_name: &str,
    ) -> Result<Subscription, Error> {
        let now = Utc::now();

        let feed = match self.db.get_feed_by_link(link.as_str()).await {
            Ok(feed) => feed,
            Err(DatabaseError::NotFound) => self.crawler.register(link, now).await?,
            Err(e) => return Err(e.into()),
        };

        let subscription = self
            .db
            .create_subscription(feed.id, server_id, channel_id, collection_name, now)
            .await?;

        tracing::info!(
            server_id = %server_id,
            collection = %collection_name,
            feed_id = feed.id,
            "Subscribed"
        );
        Ok(subscription)
    }

    pub async fn unsubscribe(&self, server_id: &str, collection_name: &str) -> Result<(), Error> {
        let subscription = self
            .db
            .get_subscription_by_collection_name(server_id, collection_name)
            .await?;
        self.db.delete_subscription(subscription.id).await?;

        tracing::info!(server_id = %server_id, collection = %collection_name, "Unsubscribed");
        Ok(())
    }

    /// Link of the newest stored article of a collection's feed.
    ///
    /// Waits on the shared rate gate, so test replies count against the same
    /// budget as notifications.
    pub async fn latest_link(
        &self,
        server_id: &str,
        collection_name: &str,
        signal: &ShutdownSignal,
    ) -> Result<String, Error> {
        let subscription = self
            .db
            .get_subscription_by_collection_name(server_id, collection_name)
            .await?;

        let article = match self.db.latest_article(subscription.feed_id).await {
            Ok(article) => article,
            Err(DatabaseError::NotFound) => return Err(Error::EmptyFeed),
            Err(e) => return Err(e.into()),
        };

        self.gate.wait(signal).await?;
        Ok(article.link)
    }

    pub async fn autocomplete(&self, server_id: &str, input: &str) -> Result<Vec<String>, Error> {
        self.completions.collection_names(server_id, input).await
    }

    pub async fn subscriptions(&self, server_id: &str) -> Result<Vec<Subscription>, Error> {
        Ok(self.db.list_subscriptions(server_id).await?)
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    pub async fn refresh_feeds(&self, now: DateTime<Utc>) -> Result<CrawlReport, Error> {
        self.crawler.refresh_ready(now).await
    }

    pub async fn announce(&self, signal: &ShutdownSignal) -> Result<NotifyReport, Error> {
        self.notifier.run_cycle(signal).await
    }
}
