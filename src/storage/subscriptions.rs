use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{
    DatabaseError, Notification, NotificationDbRow, Subscription, SubscriptionDbRow,
};

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Bind a feed to a channel under a collection name.
    ///
    /// Returns `DatabaseError::AlreadyExists` if the server already uses
    /// `collection_name`.
    pub async fn create_subscription(
        &self,
        feed_id: i64,
        server_id: &str,
        channel_id: &str,
        collection_name: &str,
        last_pub_date: DateTime<Utc>,
    ) -> Result<Subscription, DatabaseError> {
        let row = sqlx::query_as::<_, SubscriptionDbRow>(
            r#"
            INSERT INTO subscriptions (feed_id, server_id, channel_id, collection_name, last_pub_date)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, feed_id, server_id, channel_id, collection_name, last_pub_date
        "#,
        )
        .bind(feed_id)
        .bind(server_id)
        .bind(channel_id)
        .bind(collection_name)
        .bind(last_pub_date.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_subscription())
    }

    pub async fn get_subscription_by_collection_name(
        &self,
        server_id: &str,
        collection_name: &str,
    ) -> Result<Subscription, DatabaseError> {
        let row = sqlx::query_as::<_, SubscriptionDbRow>(
            r#"
            SELECT id, feed_id, server_id, channel_id, collection_name, last_pub_date
            FROM subscriptions
            WHERE server_id = ? AND collection_name = ?
        "#,
        )
        .bind(server_id)
        .bind(collection_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionDbRow::into_subscription)
            .ok_or(DatabaseError::NotFound)
    }

    /// All subscriptions of a server, ordered by collection name.
    pub async fn list_subscriptions(
        &self,
        server_id: &str,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let rows = sqlx::query_as::<_, SubscriptionDbRow>(
            r#"
            SELECT id, feed_id, server_id, channel_id, collection_name, last_pub_date
            FROM subscriptions
            WHERE server_id = ?
            ORDER BY collection_name
        "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(SubscriptionDbRow::into_subscription)
            .collect())
    }

    /// Every collection name registered for a server (autocomplete source).
    pub async fn get_collection_names(&self, server_id: &str) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT collection_name FROM subscriptions WHERE server_id = ? ORDER BY id",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn delete_subscription(&self, subscription_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Advance a subscription's delivery watermark.
    ///
    /// Only the notifier calls this, after a confirmed delivery.
    pub async fn update_last_pub_date(
        &self,
        subscription_id: i64,
        last_pub_date: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE subscriptions SET last_pub_date = ? WHERE id = ?")
            .bind(last_pub_date.timestamp())
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Every (subscription, article) pair the subscriber has not seen yet.
    ///
    /// Ordered by publication time across the whole result, not per
    /// subscription, so delivery stays chronological even when several
    /// subscriptions share a feed.
    pub async fn pending_notifications(&self) -> Result<Vec<Notification>, DatabaseError> {
        let rows = sqlx::query_as::<_, NotificationDbRow>(
            r#"
            SELECT
                s.id AS subscription_id,
                s.server_id,
                s.channel_id,
                s.collection_name,
                a.id AS article_id,
                a.title,
                a.link,
                a.published
            FROM subscriptions s
            INNER JOIN articles a ON s.feed_id = a.feed_id
            WHERE a.published > s.last_pub_date
            ORDER BY a.published ASC, a.id ASC, s.id ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(NotificationDbRow::into_notification)
            .collect())
    }
}
