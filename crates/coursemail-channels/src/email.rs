//! Email channel — authenticated SMTP submission via async lettre.
//!
//! Supports Gmail, Outlook, and custom relays over STARTTLS, implicit TLS,
//! or plaintext (local test relays only).

use std::time::Duration;

use async_trait::async_trait;
use coursemail_core::config::SmtpConfig;
use coursemail_core::error::{CourseMailError, DeliveryError, Result};
use coursemail_core::traits::DeliveryChannel;
use coursemail_core::{Attachment, RenderedMessage};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP delivery channel. The transport is built once and reused.
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    attachment_type: ContentType,
}

impl SmtpChannel {
    /// Build a channel from config. Missing host, sender, or credentials
    /// are configuration errors, so a constructed channel is always ready.
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let password = config.resolved_password();
        check_settings(config, &password)?;

        let address: Address = config
            .sender()
            .parse()
            .map_err(|e| CourseMailError::Config(format!("Invalid from address: {e}")))?;
        let from = Mailbox::new(config.display_name.clone(), address);

        let builder = match config.tls.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| CourseMailError::Config(format!("SMTP relay: {e}")))?,
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| CourseMailError::Config(format!("SMTP relay: {e}")))?,
            other => {
                return Err(CourseMailError::Config(format!(
                    "Unknown smtp.tls mode '{other}' (starttls|tls|none)"
                )));
            }
        };

        let port = config.effective_port();
        let transport = builder
            .port(port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .credentials(Credentials::new(config.username.clone(), password))
            .build();

        let attachment_type = ContentType::parse("application/octet-stream")
            .map_err(|e| CourseMailError::Config(format!("Attachment content type: {e}")))?;

        tracing::info!("📧 SMTP channel ready: {}:{port} as {}", config.host, config.sender());
        Ok(Self {
            transport,
            from,
            attachment_type,
        })
    }

    /// Build the MIME message: plain text, or multipart/mixed with one
    /// octet-stream part per attachment.
    fn build_message(
        &self,
        to: &str,
        message: &RenderedMessage,
        attachments: &[Attachment],
    ) -> std::result::Result<Message, DeliveryError> {
        let to_mailbox: Mailbox = to
            .trim()
            .parse()
            .map_err(|e| DeliveryError::Rejected(format!("Invalid to '{to}': {e}")))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(message.subject.clone());

        let email = if attachments.is_empty() {
            builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
            for a in attachments {
                parts = parts.singlepart(
                    LettreAttachment::new(a.filename.clone())
                        .body(a.content.clone(), self.attachment_type.clone()),
                );
            }
            builder.multipart(parts)
        };

        email.map_err(|e| DeliveryError::Rejected(format!("Build email: {e}")))
    }
}

fn check_settings(config: &SmtpConfig, password: &str) -> Result<()> {
    let mut missing = Vec::new();
    if config.host.trim().is_empty() {
        missing.push("smtp.host");
    }
    if config.username.trim().is_empty() {
        missing.push("smtp.username");
    }
    if password.is_empty() {
        missing.push("smtp.password");
    }
    if config.sender().is_empty() {
        missing.push("smtp.from");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CourseMailError::Config(format!(
            "Missing SMTP settings: {}",
            missing.join(", ")
        )))
    }
}

#[async_trait]
impl DeliveryChannel for SmtpChannel {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(
        &self,
        to: &str,
        message: &RenderedMessage,
        attachments: &[Attachment],
    ) -> std::result::Result<(), DeliveryError> {
        let email = self.build_message(to, message, attachments)?;

        match self.transport.send(email).await {
            Ok(_) => {
                tracing::info!("📤 Email sent to: {to}");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(DeliveryError::Rejected(format!("SMTP send: {e}"))),
            Err(e) => Err(DeliveryError::Transient(format!("SMTP send: {e}"))),
        }
    }
}
