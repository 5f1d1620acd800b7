//! Dispatch loop — one recipient at a time, failures isolated.
//!
//! Only a channel that fails [`DeliveryChannel::check_ready`] aborts a run,
//! and that happens before the first send. Everything after is converted
//! into [`DispatchOutcome`] records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use coursemail_core::config::DispatchConfig;
use coursemail_core::error::{CourseMailError, DeliveryError, Result};
use coursemail_core::traits::{DeliveryChannel, OutcomeLog};
use coursemail_core::{
    Attachment, Category, DispatchOutcome, DispatchSummary, OutcomeKind, OutcomeRecord, Recipient,
    RenderedMessage, Template,
};
use coursemail_roster::partition_addresses;
use coursemail_templates::{render, required_variables, Variables};

use crate::pacing::{Pacer, Pause, SleepPacer};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::variables::recipient_variables;

/// Retry, pacing, and batching for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub retry: RetryPolicy,
    /// After every recipient.
    pub pacing: Duration,
    /// Between two addresses of one recipient.
    pub address_gap: Duration,
    /// Recipients per batch; 0 disables batch pauses.
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_secs(config.backoff_base_secs),
            ),
            pacing: Duration::from_millis(config.pacing_ms),
            address_gap: Duration::from_millis(config.address_gap_ms),
            batch_size: config.batch_size,
            batch_pause: Duration::from_secs(config.batch_pause_secs),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

/// How templates are chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Classify each recipient against `required_count` and pick the
    /// template for its category. `list_all_missing` widens the missing
    /// list from the first `required_count` activities to all of them.
    Classified {
        required_count: u32,
        list_all_missing: bool,
    },
    /// Same template for everyone; no classification.
    Broadcast,
}

/// Cooperative stop flag, checked before each recipient. Once set, the
/// pacing and batch pauses that would precede the next recipient are skipped.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inputs of one dispatch run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'r> {
    pub recipients: &'r [Recipient],
    pub mode: RunMode,
    /// Shared variables; recipient-derived keys win on collision.
    pub shared: &'r Variables,
    /// Attached to every message.
    pub attachments: &'r [Attachment],
}

/// Progress event, one per processed recipient.
#[derive(Debug)]
pub struct RecipientReport<'a> {
    /// 1-based position in the run.
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub category: Option<Category>,
    pub outcomes: &'a [DispatchOutcome],
}

type Observer<'a> = Box<dyn Fn(&RecipientReport<'_>) + Send + Sync + 'a>;

/// Runs dispatches against one channel and one outcome log. Holds no state
/// across runs.
pub struct Dispatcher<'a> {
    channel: &'a dyn DeliveryChannel,
    log: &'a dyn OutcomeLog,
    pacer: &'a dyn Pacer,
    settings: DispatchSettings,
    stop: StopSignal,
    observer: Option<Observer<'a>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(channel: &'a dyn DeliveryChannel, log: &'a dyn OutcomeLog) -> Self {
        Self {
            channel,
            log,
            pacer: &SleepPacer,
            settings: DispatchSettings::default(),
            stop: StopSignal::new(),
            observer: None,
        }
    }

    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the sleeping pacer (tests, alternative throttles).
    pub fn pacer(mut self, pacer: &'a dyn Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Called once per processed recipient.
    pub fn on_recipient<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecipientReport<'_>) + Send + Sync + 'a,
    {
        self.observer = Some(Box::new(f));
        self
    }

    /// Dispatch to every recipient. `template_for` receives the recipient's
    /// category (`None` in broadcast mode).
    pub async fn dispatch_all<F>(
        &self,
        request: &DispatchRequest<'_>,
        template_for: F,
    ) -> Result<DispatchSummary>
    where
        F: Fn(Option<Category>) -> Result<Template>,
    {
        self.channel.check_ready()?;

        let total = request.recipients.len();
        tracing::info!(
            "🚀 Dispatch started: {total} recipient(s) via {}",
            self.channel.name()
        );

        let mut summary = DispatchSummary::default();
        for (i, recipient) in request.recipients.iter().enumerate() {
            if self.stop.is_stopped() {
                tracing::info!("🛑 Stop requested; {} recipient(s) not processed", total - i);
                summary.stopped_early = true;
                break;
            }

            let (category, outcomes) = self.process(recipient, request, &template_for).await;
            for outcome in &outcomes {
                summary.record(outcome);
                self.append(outcome);
            }
            summary.recipients += 1;

            if let Some(observer) = &self.observer {
                observer(&RecipientReport {
                    index: i + 1,
                    total,
                    name: recipient.full_name(),
                    category,
                    outcomes: &outcomes,
                });
            }

            let processed = i + 1;
            if self.stop.is_stopped() && processed < total {
                continue;
            }

            self.pacer.pause(Pause::Pacing, self.settings.pacing).await;

            if self.settings.batch_size > 0
                && processed % self.settings.batch_size == 0
                && processed < total
            {
                self.pacer
                    .pause(Pause::BatchPause { processed }, self.settings.batch_pause)
                    .await;
            }
        }

        tracing::info!(
            "🏁 Dispatch finished: {} sent, {} failed, {} retries",
            summary.succeeded,
            summary.failed,
            summary.retries
        );
        Ok(summary)
    }

    async fn process<F>(
        &self,
        recipient: &Recipient,
        request: &DispatchRequest<'_>,
        template_for: &F,
    ) -> (Option<Category>, Vec<DispatchOutcome>)
    where
        F: Fn(Option<Category>) -> Result<Template>,
    {
        let (category, vars) = recipient_variables(recipient, &request.mode, request.shared);
        let name = recipient.full_name();

        let message = match render_for(category, &vars, template_for) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("⚠️ Render failed for {name} (row {}): {e}", recipient.row);
                let outcome =
                    DispatchOutcome::failed(&name, OutcomeKind::RenderFailed, &e.to_string(), 0, None);
                return (category, vec![outcome]);
            }
        };

        let (addresses, invalid) =
            partition_addresses(recipient.addresses.iter().map(String::as_str));
        let mut outcomes: Vec<DispatchOutcome> = recipient
            .rejected_addresses
            .iter()
            .chain(&invalid)
            .map(|bad| {
                tracing::warn!("⚠️ Skipping invalid address for {name}: {bad}");
                DispatchOutcome::failed(bad, OutcomeKind::InvalidAddress, bad, 0, Some(&message.subject))
            })
            .collect();

        if addresses.is_empty() {
            outcomes.push(DispatchOutcome::failed(
                &name,
                OutcomeKind::NoAddress,
                "no valid address",
                0,
                Some(&message.subject),
            ));
            return (category, outcomes);
        }

        for (i, address) in addresses.iter().enumerate() {
            if i > 0 {
                self.pacer.pause(Pause::AddressGap, self.settings.address_gap).await;
            }
            outcomes.push(self.deliver(address, &message, request.attachments).await);
        }

        (category, outcomes)
    }

    async fn deliver(
        &self,
        address: &str,
        message: &RenderedMessage,
        attachments: &[Attachment],
    ) -> DispatchOutcome {
        let attempt = retry_with_backoff(&self.settings.retry, self.pacer, |_| {
            self.channel.send(address, message, attachments)
        })
        .await;

        match attempt.result {
            Ok(()) => {
                tracing::info!("📤 Sent to {address} ({} attempt(s))", attempt.attempts);
                DispatchOutcome::sent(address, &message.subject, attempt.attempts)
            }
            Err(DeliveryError::Rejected(detail)) => {
                tracing::warn!("❌ Rejected {address}: {detail}");
                DispatchOutcome::failed(
                    address,
                    OutcomeKind::Rejected,
                    &detail,
                    attempt.attempts,
                    Some(&message.subject),
                )
            }
            Err(DeliveryError::Transient(detail)) => {
                tracing::warn!(
                    "❌ Giving up on {address} after {} attempt(s): {detail}",
                    attempt.attempts
                );
                DispatchOutcome::failed(
                    address,
                    OutcomeKind::DeliveryFailed,
                    &detail,
                    attempt.attempts,
                    Some(&message.subject),
                )
            }
        }
    }

    fn append(&self, outcome: &DispatchOutcome) {
        let record = OutcomeRecord::from_outcome(outcome, Utc::now());
        if let Err(e) = self.log.append(&record) {
            tracing::warn!("⚠️ Failed to record outcome for {}: {e}", outcome.recipient);
        }
    }
}

fn render_for<F>(category: Option<Category>, vars: &Variables, template_for: &F) -> Result<RenderedMessage>
where
    F: Fn(Option<Category>) -> Result<Template>,
{
    let template = template_for(category)?;
    render(&template, vars).map_err(CourseMailError::from)
}

/// One message as it would be sent.
#[derive(Debug, Clone)]
pub struct PreviewItem {
    pub row: usize,
    pub name: String,
    pub category: Option<Category>,
    pub addresses: Vec<String>,
    pub rejected_addresses: Vec<String>,
    /// Rendered message, or the render error text.
    pub message: std::result::Result<RenderedMessage, String>,
}

/// Render every recipient's message without a channel, a log, or delays.
pub fn preview<F>(request: &DispatchRequest<'_>, template_for: F) -> Vec<PreviewItem>
where
    F: Fn(Option<Category>) -> Result<Template>,
{
    request
        .recipients
        .iter()
        .map(|recipient| {
            let (category, vars) = recipient_variables(recipient, &request.mode, request.shared);
            let (addresses, invalid) =
                partition_addresses(recipient.addresses.iter().map(String::as_str));
            let mut rejected_addresses = recipient.rejected_addresses.clone();
            rejected_addresses.extend(invalid);
            PreviewItem {
                row: recipient.row,
                name: recipient.full_name(),
                category,
                addresses,
                rejected_addresses,
                message: render_for(category, &vars, &template_for).map_err(|e| e.to_string()),
            }
        })
        .collect()
}

/// Placeholders that a selected template needs and no recipient's
/// variables supply, keyed by template name. Each category in use is
/// checked once, against its first recipient.
pub fn unresolved_variables<F>(
    request: &DispatchRequest<'_>,
    template_for: F,
) -> Result<BTreeMap<String, BTreeSet<String>>>
where
    F: Fn(Option<Category>) -> Result<Template>,
{
    let mut checked: Vec<Option<Category>> = Vec::new();
    let mut unresolved = BTreeMap::new();
    for recipient in request.recipients {
        let (category, vars) = recipient_variables(recipient, &request.mode, request.shared);
        if checked.contains(&category) {
            continue;
        }
        checked.push(category);

        let template = template_for(category)?;
        let missing: BTreeSet<String> = required_variables(&template)?
            .into_iter()
            .filter(|name| !vars.contains_key(name))
            .collect();
        if !missing.is_empty() {
            unresolved.insert(template.name, missing);
        }
    }
    Ok(unresolved)
}
