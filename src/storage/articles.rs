use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, DatabaseError};

/// Content address of an article link: hex SHA-256 of the serialized URL.
pub(crate) fn link_hash(link: &Url) -> String {
    let hash = Sha256::digest(link.as_str().as_bytes());
    format!("{:x}", hash)
}

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Store one feed item.
    ///
    /// The dedup key is `(feed_id, link_hash)`; a collision returns
    /// `DatabaseError::AlreadyExists`, which ingestion treats as "already seen".
    pub async fn create_article(
        &self,
        feed_id: i64,
        title: &str,
        link: &Url,
        published: DateTime<Utc>,
    ) -> Result<Article, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            INSERT INTO articles (feed_id, title, link, link_hash, published)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, link, published
        "#,
        )
        .bind(feed_id)
        .bind(title)
        .bind(link.as_str())
        .bind(link_hash(link))
        .bind(published.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_article())
    }

    /// The most recently published article of a feed.
    ///
    /// Returns `DatabaseError::NotFound` if the feed has no articles.
    pub async fn latest_article(&self, feed_id: i64) -> Result<Article, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, feed_id, title, link, published
            FROM articles
            WHERE feed_id = ?
            ORDER BY published DESC, id DESC
            LIMIT 1
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArticleDbRow::into_article)
            .ok_or(DatabaseError::NotFound)
    }

    /// Number of stored articles for a feed.
    pub async fn count_articles(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
