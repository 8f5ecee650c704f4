use chrono::{DateTime, Utc};
use url::Url;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedDbRow};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a new feed source.
    ///
    /// Returns `DatabaseError::AlreadyExists` if the link is already registered.
    pub async fn create_feed(
        &self,
        link: &Url,
        not_until: DateTime<Utc>,
    ) -> Result<Feed, DatabaseError> {
        let row = sqlx::query_as::<_, FeedDbRow>(
            "INSERT INTO feeds (link, not_until) VALUES (?, ?) RETURNING id, link, not_until",
        )
        .bind(link.as_str())
        .bind(not_until.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_feed())
    }

    /// All feeds whose cool-down has elapsed (`not_until <= as_of`).
    pub async fn list_ready_feeds(&self, as_of: DateTime<Utc>) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedDbRow>(
            "SELECT id, link, not_until FROM feeds WHERE not_until <= ? ORDER BY not_until, id",
        )
        .bind(as_of.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    /// Look up a feed by its exact link.
    pub async fn get_feed_by_link(&self, link: &str) -> Result<Feed, DatabaseError> {
        let row = sqlx::query_as::<_, FeedDbRow>(
            "SELECT id, link, not_until FROM feeds WHERE link = ?",
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedDbRow::into_feed).ok_or(DatabaseError::NotFound)
    }

    /// Persist a feed's link and cool-down.
    pub async fn update_feed(&self, feed: &Feed) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET link = ?, not_until = ? WHERE id = ?")
            .bind(&feed.link)
            .bind(feed.not_until.timestamp())
            .bind(feed.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Remove a feed together with its articles and subscriptions.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, Feed};
    use chrono::{TimeZone, Utc};
    use url::Url;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn link(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_empty_database_has_no_ready_feeds() {
        let db = test_db().await;
        let far_future = Utc.with_ymd_and_hms(4999, 12, 31, 0, 0, 0).unwrap();
        let ready = db.list_ready_feeds(far_future).await.unwrap();
        assert!(ready.is_empty());
    }

    #[tokio::test]
    async fn test_create_and_get_by_link() {
        let db = test_db().await;
        let not_until = Utc.with_ymd_and_hms(2023, 2, 2, 2, 2, 2).unwrap();

        let created = db
            .create_feed(&link("http://example.com/?rss"), not_until)
            .await
            .unwrap();
        assert_eq!(created.link, "http://example.com/?rss");
        assert_eq!(created.not_until, not_until);

        let fetched = db.get_feed_by_link(&created.link).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_link_already_exists() {
        let db = test_db().await;
        let not_until = Utc.with_ymd_and_hms(2023, 2, 2, 2, 2, 2).unwrap();
        let url = link("http://example.com/?rss");

        db.create_feed(&url, not_until).await.unwrap();
        let err = db.create_feed(&url, not_until).await.unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_get_unknown_link_not_found() {
        let db = test_db().await;
        let err = db
            .get_feed_by_link("http://does-not-exist.test/")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));
    }

    #[tokio::test]
    async fn test_list_ready_respects_not_until() {
        let db = test_db().await;
        let early = Utc.with_ymd_and_hms(2023, 2, 2, 2, 2, 2).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 4, 4, 4, 4, 4).unwrap();

        let a = db.create_feed(&link("https://a.example.com/rss"), early).await.unwrap();
        db.create_feed(&link("https://b.example.com/rss"), late).await.unwrap();

        let as_of = Utc.with_ymd_and_hms(2023, 3, 3, 3, 3, 3).unwrap();
        let ready = db.list_ready_feeds(as_of).await.unwrap();
        assert_eq!(ready, vec![a]);

        // Boundary is inclusive
        let ready = db.list_ready_feeds(late).await.unwrap();
        assert_eq!(ready.len(), 2);
    }

    #[tokio::test]
    async fn test_update_feed_persists_cool_down() {
        let db = test_db().await;
        let early = Utc.with_ymd_and_hms(2023, 2, 2, 2, 2, 2).unwrap();
        let feed = db.create_feed(&link("https://a.example.com/rss"), early).await.unwrap();

        let updated = Feed {
            id: feed.id,
            link: "https://a-brand-new-link.example.com/rss".to_string(),
            not_until: Utc.with_ymd_and_hms(2023, 5, 5, 5, 5, 5).unwrap(),
        };
        db.update_feed(&updated).await.unwrap();

        let fetched = db.get_feed_by_link(&updated.link).await.unwrap();
        assert_eq!(fetched, updated);

        let as_of = Utc.with_ymd_and_hms(2023, 3, 3, 3, 3, 3).unwrap();
        assert!(db.list_ready_feeds(as_of).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_feed_not_found() {
        let db = test_db().await;
        let ghost = Feed {
            id: 42,
            link: "https://ghost.example.com/rss".to_string(),
            not_until: Utc::now(),
        };
        assert!(matches!(
            db.update_feed(&ghost).await.unwrap_err(),
            DatabaseError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_delete_feed() {
        let db = test_db().await;
        let early = Utc.with_ymd_and_hms(2023, 2, 2, 2, 2, 2).unwrap();
        let feed = db.create_feed(&link("https://a.example.com/rss"), early).await.unwrap();

        db.delete_feed(feed.id).await.unwrap();

        let ready = db.list_ready_feeds(Utc::now()).await.unwrap();
        assert!(ready.is_empty());
    }
}
