//! Rate-limited delivery of new articles to subscribed channels.

mod delivery;
mod notifier;
mod rate_gate;

pub use delivery::{Delivery, DeliveryError, LogDelivery, WebhookDelivery};
pub use notifier::{render_notification, Notifier, NotifyReport};
pub use rate_gate::RateGate;
