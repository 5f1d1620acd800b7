//! Pacing strategy — every wait in a dispatch run goes through here.

use std::time::Duration;

use async_trait::async_trait;

/// Why the dispatcher is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Before retry `attempt + 1` of one address.
    Backoff { attempt: u32 },
    /// Between two addresses of the same recipient.
    AddressGap,
    /// After a recipient is fully processed.
    Pacing,
    /// After every full batch of recipients.
    BatchPause { processed: usize },
}

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, reason: Pause, duration: Duration);
}

/// Default pacer: sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

#[async_trait]
impl Pacer for SleepPacer {
    async fn pause(&self, reason: Pause, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        match reason {
            Pause::BatchPause { processed } => {
                tracing::info!("⏸️ Batch pause after {processed} recipient(s): {duration:?}");
            }
            other => tracing::debug!("Pause {other:?}: {duration:?}"),
        }
        tokio::time::sleep(duration).await;
    }
}
