use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::haystack::{pattern, Haystack};
use crate::error::Error;
use crate::storage::{Database, DatabaseError};

pub const DEFAULT_TTL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_RESULTS: usize = 25;

/// Where the cache loads a server's collection names from on a miss.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    async fn collection_names(&self, server_id: &str) -> Result<Vec<String>, DatabaseError>;
}

#[async_trait]
impl CollectionSource for Database {
    async fn collection_names(&self, server_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.get_collection_names(server_id).await
    }
}

struct CacheState {
    entries: HashMap<String, Haystack>,
    /// One deadline for every entry; passing it empties the cache.
    /// `None` when the TTL is too large to represent.
    expires: Option<Instant>,
}

/// Autocomplete over collection names, cached per server for `ttl`.
///
/// The lock is held for the whole lookup, including the load on a miss, so
/// concurrent lookups for the same server load it once.
pub struct CollectionSearchCache<S> {
    source: S,
    ttl: Duration,
    max_results: usize,
    state: Mutex<CacheState>,
}

impl<S: CollectionSource> CollectionSearchCache<S> {
    pub fn new(source: S, ttl: Duration, max_results: usize) -> Self {
        Self {
            source,
            ttl,
            max_results,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                expires: Instant::now().checked_add(ttl),
            }),
        }
    }

    /// Collection names of `server_id` matching `input`, at most
    /// `max_results`, in registration order.
    pub async fn collection_names(
        &self,
        server_id: &str,
        input: &str,
    ) -> Result<Vec<String>, Error> {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if state.expires.is_some_and(|expires| now >= expires) {
            state.entries.clear();
            state.expires = now.checked_add(self.ttl);
        }

        if !state.entries.contains_key(server_id) {
            let names = self.source.collection_names(server_id).await?;
            tracing::debug!(server_id = %server_id, names = names.len(), "Loaded collection names");
            state
                .entries
                .insert(server_id.to_string(), Haystack::new(&names));
        }
        let Some(haystack) = state.entries.get(server_id) else {
            return Ok(Vec::new());
        };

        let re = match pattern(input) {
            Ok(re) => re,
            Err(e) => {
                // Only reachable for inputs past the regex size limit
                tracing::debug!(error = %e, "Autocomplete input rejected");
                return Ok(Vec::new());
            }
        };

        Ok(haystack
            .find_all(&re)
            .into_iter()
            .take(self.max_results)
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory source that counts loads.
    #[derive(Default)]
    struct CountingSource {
        names: std::sync::Mutex<HashMap<String, Vec<String>>>,
        loads: AtomicUsize,
    }

    impl CountingSource {
        fn with(server_id: &str, names: &[&str]) -> Self {
            let source = Self::default();
            source.set(server_id, names);
            source
        }

        fn set(&self, server_id: &str, names: &[&str]) {
            self.names.lock().unwrap().insert(
                server_id.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            );
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CollectionSource for Arc<CountingSource> {
        async fn collection_names(&self, server_id: &str) -> Result<Vec<String>, DatabaseError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .names
                .lock()
                .unwrap()
                .get(server_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CollectionSource for FailingSource {
        async fn collection_names(&self, _: &str) -> Result<Vec<String>, DatabaseError> {
            Err(DatabaseError::InstanceLocked)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_filters_and_caches() {
        let source = Arc::new(CountingSource::with(
            "server-1",
            &["The Official Go Blog", "Kubernetes Feed"],
        ));
        let cache = CollectionSearchCache::new(source.clone(), DEFAULT_TTL, DEFAULT_MAX_RESULTS);

        assert_eq!(
            cache.collection_names("server-1", "go").await.unwrap(),
            vec!["The Official Go Blog".to_string()]
        );
        assert_eq!(
            cache.collection_names("server-1", "").await.unwrap(),
            vec![
                "The Official Go Blog".to_string(),
                "Kubernetes Feed".to_string()
            ]
        );
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_are_per_server() {
        let source = Arc::new(CountingSource::with("server-1", &["Go Blog"]));
        source.set("server-2", &["Rust Blog"]);
        let cache = CollectionSearchCache::new(source.clone(), DEFAULT_TTL, DEFAULT_MAX_RESULTS);

        assert_eq!(
            cache.collection_names("server-2", "blog").await.unwrap(),
            vec!["Rust Blog".to_string()]
        );
        assert_eq!(
            cache.collection_names("server-1", "blog").await.unwrap(),
            vec!["Go Blog".to_string()]
        );
        assert!(cache
            .collection_names("server-3", "")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(source.loads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_until_ttl_then_reloaded() {
        let source = Arc::new(CountingSource::with("server-1", &["Go Blog"]));
        let cache = CollectionSearchCache::new(source.clone(), DEFAULT_TTL, DEFAULT_MAX_RESULTS);

        cache.collection_names("server-1", "").await.unwrap();
        source.set("server-1", &["Go Blog", "Go Weekly"]);

        tokio::time::advance(Duration::from_secs(14)).await;
        assert_eq!(cache.collection_names("server-1", "go").await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            cache.collection_names("server-1", "go").await.unwrap(),
            vec!["Go Blog".to_string(), "Go Weekly".to_string()]
        );
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_truncated() {
        let names: Vec<String> = (0..40).map(|i| format!("feed {i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let source = Arc::new(CountingSource::with("server-1", &refs));
        let cache = CollectionSearchCache::new(source, DEFAULT_TTL, DEFAULT_MAX_RESULTS);

        let found = cache.collection_names("server-1", "feed").await.unwrap();
        assert_eq!(found.len(), DEFAULT_MAX_RESULTS);
        assert_eq!(found[0], "feed 00");
        assert_eq!(found[24], "feed 24");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_load_once() {
        let source = Arc::new(CountingSource::with("server-1", &["Go Blog"]));
        let cache = Arc::new(CollectionSearchCache::new(
            source.clone(),
            DEFAULT_TTL,
            DEFAULT_MAX_RESULTS,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.collection_names("server-1", "go").await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let source = Arc::new(CountingSource::with("server-1", &["Go Blog"]));
        let cache = CollectionSearchCache::new(source.clone(), Duration::MAX, DEFAULT_MAX_RESULTS);

        cache.collection_names("server-1", "go").await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.collection_names("server-1", "go").await.unwrap().len(), 1);
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let cache = CollectionSearchCache::new(FailingSource, DEFAULT_TTL, DEFAULT_MAX_RESULTS);
        let err = cache.collection_names("server-1", "go").await.unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::InstanceLocked)));
    }

    #[tokio::test]
    async fn test_database_source() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .create_feed(
                &url::Url::parse("https://go.dev/blog/feed.atom").unwrap(),
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        db.create_subscription(feed.id, "server-1", "c", "Go Blog", chrono::Utc::now())
            .await
            .unwrap();

        let cache = CollectionSearchCache::new(db, DEFAULT_TTL, DEFAULT_MAX_RESULTS);
        assert_eq!(
            cache.collection_names("server-1", "BLOG").await.unwrap(),
            vec!["Go Blog".to_string()]
        );
    }
}
