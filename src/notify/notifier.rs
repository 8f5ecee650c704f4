use std::sync::Arc;

use super::delivery::Delivery;
use super::rate_gate::RateGate;
use crate::error::Error;
use crate::shutdown::ShutdownSignal;
use crate::storage::Database;

/// Outcome of one notify cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub pending: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub fn render_notification(collection_name: &str, link: &str) -> String {
    format!("New item from collection \"{collection_name}\": {link}")
}

/// Delivers pending (subscription, article) pairs and advances watermarks.
pub struct Notifier {
    db: Database,
    delivery: Arc<dyn Delivery>,
    gate: Arc<RateGate>,
}

impl Notifier {
    pub fn new(db: Database, delivery: Arc<dyn Delivery>, gate: Arc<RateGate>) -> Self {
        Self {
            db,
            delivery,
            gate,
        }
    }

    /// Deliver every pending notification, oldest first.
    ///
    /// A watermark moves only after its message was accepted. Failed sends
    /// are logged and left for the next cycle. Returns [`Error::Canceled`] as
    /// soon as `signal` fires while waiting on the rate gate.
    pub async fn run_cycle(&self, signal: &ShutdownSignal) -> Result<NotifyReport, Error> {
        let pending = self.db.pending_notifications().await?;
        let mut report = NotifyReport {
            pending: pending.len(),
            ..NotifyReport::default()
        };

        for notification in pending {
            if let Err(canceled) = self.gate.wait(signal).await {
                tracing::info!(
                    delivered = report.delivered,
                    remaining = report.pending - report.delivered - report.failed,
                    "Notify cycle canceled"
                );
                return Err(canceled.into());
            }

            let text = render_notification(&notification.collection_name, &notification.link);
            if let Err(e) = self.delivery.send(&notification.channel_id, &text).await {
                report.failed += 1;
                tracing::warn!(
                    subscription_id = notification.subscription_id,
                    article_id = notification.article_id,
                    channel_id = %notification.channel_id,
                    error = %e,
                    "Notification delivery failed"
                );
                continue;
            }
            report.delivered += 1;

            // Sent but not recorded: the item is delivered again next cycle
            if let Err(e) = self
                .db
                .update_last_pub_date(notification.subscription_id, notification.published)
                .await
            {
                tracing::warn!(
                    subscription_id = notification.subscription_id,
                    error = %e,
                    "Failed to advance watermark"
                );
            }
        }

        if report.pending > 0 {
            tracing::info!(
                pending = report.pending,
                delivered = report.delivered,
                failed = report.failed,
                "Notify cycle finished"
            );
        }
        Ok(report)
    }
}
