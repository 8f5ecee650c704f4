use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors.
///
/// `NotFound` and `AlreadyExists` are the two signals callers branch on; every
/// other failure is carried through unchanged in `Other`.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The query matched no row
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write
    #[error("already exists")]
    AlreadyExists,

    /// Another process holds the database lock past the busy timeout
    #[error("The database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::AlreadyExists
            }
            other => DatabaseError::Other(other),
        }
    }
}

impl DatabaseError {
    /// Classify a connection-time sqlx error, detecting lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::from(err)
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are stored as INTEGER unix seconds.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub link: String,
    pub not_until: i64,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            link: self.link,
            not_until: from_unix(self.not_until),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub published: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            link: self.link,
            published: from_unix(self.published),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub server_id: String,
    pub channel_id: String,
    pub collection_name: String,
    pub last_pub_date: i64,
}

impl SubscriptionDbRow {
    pub(crate) fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id,
            feed_id: self.feed_id,
            server_id: self.server_id,
            channel_id: self.channel_id,
            collection_name: self.collection_name,
            last_pub_date: from_unix(self.last_pub_date),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NotificationDbRow {
    pub subscription_id: i64,
    pub server_id: String,
    pub channel_id: String,
    pub collection_name: String,
    pub article_id: i64,
    pub title: String,
    pub link: String,
    pub published: i64,
}

impl NotificationDbRow {
    pub(crate) fn into_notification(self) -> Notification {
        Notification {
            subscription_id: self.subscription_id,
            server_id: self.server_id,
            channel_id: self.channel_id,
            collection_name: self.collection_name,
            article_id: self.article_id,
            title: self.title,
            link: self.link,
            published: from_unix(self.published),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered feed source and its crawl cool-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub link: String,
    /// Earliest time the crawler may fetch this feed again
    pub not_until: DateTime<Utc>,
}

/// One ingested feed item. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
}

/// A feed bound to a destination channel under a collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub feed_id: i64,
    pub server_id: String,
    pub channel_id: String,
    /// Unique per `server_id`
    pub collection_name: String,
    /// Articles published at or before this instant count as delivered
    pub last_pub_date: DateTime<Utc>,
}

/// A pending (subscription, article) pair. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subscription_id: i64,
    pub server_id: String,
    pub channel_id: String,
    pub collection_name: String,
    pub article_id: i64,
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
}
