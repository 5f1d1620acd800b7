//! Data model shared by the roster, renderer, dispatcher, and stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Classification bucket driving template selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Progress reached the required count.
    Complete,
    /// Some progress, below the required count.
    Partial,
    /// No progress at all.
    None,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Complete => "complete",
            Category::Partial => "partial",
            Category::None => "none",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "complete" => Ok(Category::Complete),
            "partial" => Ok(Category::Partial),
            "none" => Ok(Category::None),
            other => Err(format!("unknown category '{other}' (complete|partial|none)")),
        }
    }
}

/// One graded activity as seen in a single spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMark {
    /// Display name of the activity.
    pub name: String,
    /// Whether the cell held a value greater than zero.
    pub completed: bool,
}

/// One addressee materialized from a spreadsheet row. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    /// 1-based data row in the source file (header excluded).
    pub row: usize,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Valid, deduplicated addresses in column order.
    pub addresses: Vec<String>,
    /// Non-empty cells that failed address validation.
    pub rejected_addresses: Vec<String>,
    /// Raw cells keyed by column header.
    pub attributes: BTreeMap<String, String>,
    /// Activity marks in profile column order.
    pub activities: Vec<ActivityMark>,
}

impl Recipient {
    /// First and last name joined, trimmed.
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.trim().is_empty() => {
                format!("{} {}", self.first_name.trim(), last.trim())
            }
            _ => self.first_name.trim().to_string(),
        }
    }

    /// Number of completed activities.
    pub fn progress_count(&self) -> u32 {
        self.activities.iter().filter(|a| a.completed).count() as u32
    }

    /// Names of completed activities, in column order.
    pub fn completed_activities(&self) -> Vec<&str> {
        self.activities
            .iter()
            .filter(|a| a.completed)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names of incomplete activities among the first `window` activities.
    pub fn missing_activities(&self, window: usize) -> Vec<&str> {
        self.activities
            .iter()
            .take(window)
            .filter(|a| !a.completed)
            .map(|a| a.name.as_str())
            .collect()
    }
}

/// Subject/body pattern with `{placeholder}` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Human-readable label shown in listings.
    pub name: String,
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn new(name: &str, subject: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

/// Concrete subject and body for one recipient. Never retained after the
/// dispatch step that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// File attached to every message of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: &str, content: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content,
        }
    }

    /// Read an attachment from disk, named after the file.
    pub fn from_path(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".into());
        Ok(Self { filename, content })
    }
}

/// Why an outcome ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Sent,
    /// Transient failures on every attempt.
    DeliveryFailed,
    /// The relay refused the address permanently.
    Rejected,
    /// Address failed local validation; never handed to the channel.
    InvalidAddress,
    /// Template rendering failed for the recipient.
    RenderFailed,
    /// Recipient had no deliverable address at all.
    NoAddress,
}

/// Result of one delivery attempt sequence. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Address, or the recipient's name for recipient-level failures.
    pub recipient: String,
    pub succeeded: bool,
    pub kind: OutcomeKind,
    /// Last error detail, or "sent".
    pub detail: String,
    /// Delivery attempts made (0 when the channel was never called).
    pub attempts: u32,
    /// Rendered subject, when rendering got that far.
    pub subject: Option<String>,
}

impl DispatchOutcome {
    pub fn sent(address: &str, subject: &str, attempts: u32) -> Self {
        Self {
            recipient: address.to_string(),
            succeeded: true,
            kind: OutcomeKind::Sent,
            detail: "sent".into(),
            attempts,
            subject: Some(subject.to_string()),
        }
    }

    pub fn failed(
        recipient: &str,
        kind: OutcomeKind,
        detail: &str,
        attempts: u32,
        subject: Option<&str>,
    ) -> Self {
        Self {
            recipient: recipient.to_string(),
            succeeded: false,
            kind,
            detail: detail.to_string(),
            attempts,
            subject: subject.map(String::from),
        }
    }

    /// Outcome text as written to the log.
    pub fn describe(&self) -> String {
        match self.kind {
            OutcomeKind::Sent => "sent".into(),
            OutcomeKind::DeliveryFailed => {
                format!("failed after {} attempt(s): {}", self.attempts, self.detail)
            }
            OutcomeKind::Rejected => format!("rejected: {}", self.detail),
            OutcomeKind::InvalidAddress => format!("invalid address: {}", self.detail),
            OutcomeKind::RenderFailed => format!("render failed: {}", self.detail),
            OutcomeKind::NoAddress => "no valid address".into(),
        }
    }
}

/// A row of the outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub recipient: String,
    pub outcome: String,
}

impl OutcomeRecord {
    pub fn from_outcome(outcome: &DispatchOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            subject: outcome.subject.clone().unwrap_or_default(),
            recipient: outcome.recipient.clone(),
            outcome: outcome.describe(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == "sent"
    }
}

/// Totals for one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Recipients fully processed before the run ended.
    pub recipients: usize,
    /// Outcomes recorded (address-level plus recipient-level).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Delivery attempts beyond the first, across all addresses.
    pub retries: u32,
    /// A stop signal ended the run before the last recipient.
    pub stopped_early: bool,
}

impl DispatchSummary {
    pub fn record(&mut self, outcome: &DispatchOutcome) {
        self.attempted += 1;
        if outcome.succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.retries += outcome.attempts.saturating_sub(1);
    }
}
