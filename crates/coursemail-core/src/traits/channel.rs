//! Delivery channel trait — authenticated mail submission.

use async_trait::async_trait;

use crate::error::{DeliveryError, Result};
use crate::types::{Attachment, RenderedMessage};

/// Sends one rendered message to one address. The sender identity belongs
/// to the channel's own configuration.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Validate credentials and settings before a run. Called once, before
    /// the first send; an error here aborts the whole run.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Deliver `message` to `to` with the given attachments.
    async fn send(
        &self,
        to: &str,
        message: &RenderedMessage,
        attachments: &[Attachment],
    ) -> std::result::Result<(), DeliveryError>;
}
