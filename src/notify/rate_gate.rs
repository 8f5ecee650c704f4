use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::shutdown::{Canceled, ShutdownSignal};

/// Token bucket with a burst of one: at most one caller passes per `interval`.
///
/// Shared by notification delivery and the test command so both count against
/// the same outbound budget.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    next: Mutex<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Mutex::new(Instant::now()),
        }
    }

    /// Wait for the next free slot, or return early if `signal` fires.
    ///
    /// Slots are handed out in call order. A cancelled wait still consumes
    /// its slot.
    pub async fn wait(&self, signal: &ShutdownSignal) -> Result<(), Canceled> {
        if signal.is_cancelled() {
            return Err(Canceled);
        }

        let slot = {
            let mut next = self.next.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(Canceled),
            _ = sleep_until(slot) => Ok(()),
        }
    }
}
