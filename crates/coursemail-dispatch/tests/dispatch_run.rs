//! End-to-end dispatch runs against a scripted channel and a recording pacer.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coursemail_core::error::{CourseMailError, DeliveryError, Result};
use coursemail_core::traits::DeliveryChannel;
use coursemail_core::{
    ActivityMark, Attachment, Category, DispatchOutcome, Recipient, RenderedMessage, Template,
};
use coursemail_dispatch::{
    preview, unresolved_variables, DispatchRequest, DispatchSettings, Dispatcher, Pacer, Pause,
    RetryPolicy, RunMode, StopSignal,
};
use coursemail_store::MemoryOutcomeLog;
use coursemail_templates::Variables;

// ── Fakes ─────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedChannel {
    /// Per-address queue of results; an empty queue means success.
    script: Mutex<HashMap<String, VecDeque<std::result::Result<(), DeliveryError>>>>,
    sent: Mutex<Vec<(String, String)>>,
    not_ready: bool,
}

impl ScriptedChannel {
    fn fail_with(self, address: &str, results: Vec<std::result::Result<(), DeliveryError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(address.to_string(), results.into());
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check_ready(&self) -> Result<()> {
        if self.not_ready {
            return Err(CourseMailError::Config("Missing SMTP settings: smtp.password".into()));
        }
        Ok(())
    }

    async fn send(
        &self,
        to: &str,
        message: &RenderedMessage,
        _attachments: &[Attachment],
    ) -> std::result::Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.subject.clone()));
        self.script
            .lock()
            .unwrap()
            .get_mut(to)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(()))
    }
}

#[derive(Default)]
struct RecordingPacer(Mutex<Vec<(Pause, Duration)>>);

impl RecordingPacer {
    fn count(&self, f: impl Fn(&Pause) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|(p, _)| f(p)).count()
    }

    fn pauses(&self) -> Vec<(Pause, Duration)> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, reason: Pause, duration: Duration) {
        self.0.lock().unwrap().push((reason, duration));
    }
}

// ── Fixtures ──────────────────────────────────────────────

fn recipient(name: &str, progress: usize, activities: usize, addresses: &[&str]) -> Recipient {
    Recipient {
        row: 1,
        first_name: name.to_string(),
        last_name: None,
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
        rejected_addresses: vec![],
        attributes: BTreeMap::new(),
        activities: (0..activities)
            .map(|i| ActivityMark {
                name: format!("R{}", i + 1),
                completed: i < progress,
            })
            .collect(),
    }
}

fn settings(batch_size: usize) -> DispatchSettings {
    DispatchSettings {
        retry: RetryPolicy::new(3, Duration::from_secs(3)),
        pacing: Duration::from_secs(1),
        address_gap: Duration::from_millis(800),
        batch_size,
        batch_pause: Duration::from_secs(15),
    }
}

fn by_category(category: Option<Category>) -> Result<Template> {
    Ok(match category {
        Some(Category::Complete) => Template::new("done", "Well done {name}", "All {progress} in."),
        Some(Category::Partial) => Template::new("partial", "Keep going {name}", "Missing:\n{missing_activities}"),
        Some(Category::None) => Template::new("none", "Getting started, {name}?", "Nothing yet."),
        None => Template::new("welcome", "Welcome {name}", "Hello."),
    })
}

fn classified(required_count: u32) -> RunMode {
    RunMode::Classified {
        required_count,
        list_all_missing: false,
    }
}

fn request<'r>(recipients: &'r [Recipient], mode: RunMode, shared: &'r Variables) -> DispatchRequest<'r> {
    DispatchRequest {
        recipients,
        mode,
        shared,
        attachments: &[],
    }
}

// ── Tests ─────────────────────────────────────────────────

#[tokio::test]
async fn every_first_attempt_succeeds() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients: Vec<Recipient> = (0..4)
        .map(|i| recipient(&format!("R{i}"), 1, 3, &[&format!("r{i}@school.edu")]))
        .collect();
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    assert_eq!(summary.recipients, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.retries, 0);
    assert!(!summary.stopped_early);
    assert_eq!(log.len(), 4);
    assert!(log.records().iter().all(|r| r.succeeded()));
    assert_eq!(pacer.count(|p| matches!(p, Pause::Backoff { .. })), 0);
}

#[tokio::test]
async fn two_transient_failures_then_success() {
    let channel = ScriptedChannel::default().fail_with(
        "bo@school.edu",
        vec![
            Err(DeliveryError::Transient("connection reset".into())),
            Err(DeliveryError::Transient("timeout".into())),
        ],
    );
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![recipient("Bo", 3, 5, &["bo@school.edu"])];
    let shared = Variables::new();

    let outcomes = Arc::new(Mutex::new(Vec::<DispatchOutcome>::new()));
    let seen = outcomes.clone();
    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .on_recipient(move |report| seen.lock().unwrap().extend_from_slice(report.outcomes))
        .dispatch_all(&request(&recipients, classified(5), &shared), by_category)
        .await
        .unwrap();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].succeeded);
    assert_eq!(outcomes[0].attempts, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.retries, 2);
    assert_eq!(channel.calls().len(), 3);

    let backoffs: Vec<Duration> = pacer
        .pauses()
        .into_iter()
        .filter(|(p, _)| matches!(p, Pause::Backoff { .. }))
        .map(|(_, d)| d)
        .collect();
    assert_eq!(backoffs, vec![Duration::from_secs(3), Duration::from_secs(6)]);
}

#[tokio::test]
async fn exhausted_retries_record_last_error() {
    let channel = ScriptedChannel::default().fail_with(
        "cy@school.edu",
        vec![
            Err(DeliveryError::Transient("421 try later".into())),
            Err(DeliveryError::Transient("421 try later".into())),
            Err(DeliveryError::Transient("timeout".into())),
        ],
    );
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![
        recipient("Cy", 0, 3, &["cy@school.edu"]),
        recipient("Di", 0, 3, &["di@school.edu"]),
    ];
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, classified(3), &shared), by_category)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    let records = log.records();
    assert_eq!(records[0].recipient, "cy@school.edu");
    assert_eq!(records[0].outcome, "failed after 3 attempt(s): timeout");
    assert!(records[1].succeeded());
}

#[tokio::test]
async fn rejection_is_recorded_without_retry() {
    let channel = ScriptedChannel::default().fail_with(
        "gone@school.edu",
        vec![Err(DeliveryError::Rejected("550 mailbox unavailable".into()))],
    );
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![recipient("Ed", 1, 2, &["gone@school.edu", "ed@home.com"])];
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, classified(2), &shared), by_category)
        .await
        .unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retries, 0);
    assert_eq!(channel.calls().len(), 2);
    assert_eq!(log.records()[0].outcome, "rejected: 550 mailbox unavailable");
    assert_eq!(pacer.count(|p| *p == Pause::AddressGap), 1);
}

#[tokio::test]
async fn categories_select_distinct_templates() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![
        recipient("Ana", 0, 7, &["ana@school.edu"]),
        recipient("Bo", 3, 7, &["bo@school.edu"]),
        recipient("Cy", 7, 7, &["cy@school.edu"]),
    ];
    let shared = Variables::new();

    let categories = Arc::new(Mutex::new(Vec::new()));
    let seen = categories.clone();
    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .on_recipient(move |report| seen.lock().unwrap().push(report.category))
        .dispatch_all(&request(&recipients, classified(5), &shared), by_category)
        .await
        .unwrap();

    assert_eq!(
        *categories.lock().unwrap(),
        vec![Some(Category::None), Some(Category::Partial), Some(Category::Complete)]
    );
    assert_eq!(summary.succeeded, 3);

    let subjects: Vec<String> = log.records().into_iter().map(|r| r.subject).collect();
    assert_eq!(
        subjects,
        vec!["Getting started, Ana?", "Keep going Bo", "Well done Cy"]
    );
}

#[tokio::test]
async fn batch_pauses_after_every_full_batch() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients: Vec<Recipient> = (0..5)
        .map(|i| recipient(&format!("S{i}"), 1, 1, &[&format!("s{i}@school.edu")]))
        .collect();
    let shared = Variables::new();

    Dispatcher::new(&channel, &log)
        .settings(settings(2))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    assert_eq!(pacer.count(|p| *p == Pause::Pacing), 5);
    let batches: Vec<Pause> = pacer
        .pauses()
        .into_iter()
        .filter_map(|(p, _)| matches!(p, Pause::BatchPause { .. }).then_some(p))
        .collect();
    assert_eq!(
        batches,
        vec![
            Pause::BatchPause { processed: 2 },
            Pause::BatchPause { processed: 4 }
        ]
    );
}

#[tokio::test]
async fn stop_signal_halts_between_recipients() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients: Vec<Recipient> = (0..5)
        .map(|i| recipient(&format!("T{i}"), 1, 1, &[&format!("t{i}@school.edu")]))
        .collect();
    let shared = Variables::new();

    let stop = StopSignal::new();
    let trigger = stop.clone();
    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .stop_signal(stop)
        .on_recipient(move |report| {
            if report.index == 2 {
                trigger.stop();
            }
        })
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    assert!(summary.stopped_early);
    assert_eq!(summary.recipients, 2);
    assert_eq!(channel.calls().len(), 2);
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn stop_skips_pending_pauses() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients: Vec<Recipient> = (0..4)
        .map(|i| recipient(&format!("U{i}"), 1, 1, &[&format!("u{i}@school.edu")]))
        .collect();
    let shared = Variables::new();

    let stop = StopSignal::new();
    let trigger = stop.clone();
    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(2))
        .pacer(&pacer)
        .stop_signal(stop)
        .on_recipient(move |report| {
            if report.index == 2 {
                trigger.stop();
            }
        })
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    assert!(summary.stopped_early);
    assert_eq!(summary.recipients, 2);
    assert_eq!(pacer.count(|p| *p == Pause::Pacing), 1);
    assert_eq!(pacer.count(|p| matches!(p, Pause::BatchPause { .. })), 0);
}

#[tokio::test]
async fn duplicate_addresses_are_sent_once() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![recipient(
        "Ana",
        1,
        2,
        &["ana@x.io", "ANA@x.io", " ana@x.io ", "ana@home.com"],
    )];
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    let sent_to: Vec<String> = channel.calls().into_iter().map(|(to, _)| to).collect();
    assert_eq!(sent_to, vec!["ana@x.io", "ana@home.com"]);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(log.len(), 2);
    assert_eq!(pacer.count(|p| *p == Pause::AddressGap), 1);
}

#[tokio::test]
async fn malformed_address_in_list_is_reported_not_sent() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![recipient("Gus", 1, 2, &["gus@", "gus@school.edu"])];
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, RunMode::Broadcast, &shared), by_category)
        .await
        .unwrap();

    assert_eq!(channel.calls().len(), 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(log.records()[0].outcome, "invalid address: gus@");
}

#[test]
fn unresolved_variables_name_the_template() {
    let recipients = vec![
        recipient("Ana", 0, 3, &["ana@school.edu"]),
        recipient("Bo", 1, 3, &["bo@school.edu"]),
        recipient("Cy", 1, 3, &["cy@school.edu"]),
    ];
    let templates = |category: Option<Category>| match category {
        Some(Category::Partial) => Ok(Template::new("weekly", "Week {week}", "Hi {name}, {module}")),
        other => by_category(other),
    };

    let shared = Variables::new();
    let unresolved = unresolved_variables(&request(&recipients, classified(3), &shared), templates).unwrap();
    assert_eq!(unresolved.len(), 1);
    let names: Vec<&str> = unresolved["weekly"].iter().map(String::as_str).collect();
    assert_eq!(names, vec!["module", "week"]);

    let shared = Variables::from([
        ("week".to_string(), "4".to_string()),
        ("module".to_string(), "Logic".to_string()),
    ]);
    let unresolved = unresolved_variables(&request(&recipients, classified(3), &shared), templates).unwrap();
    assert!(unresolved.is_empty());
}

#[tokio::test]
async fn render_failure_is_isolated() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![
        recipient("Ana", 0, 3, &["ana@school.edu"]),
        recipient("Bo", 1, 3, &["bo@school.edu"]),
        recipient("Cy", 3, 3, &["cy@school.edu"]),
    ];
    let shared = Variables::new();

    let templates = |category: Option<Category>| match category {
        Some(Category::Partial) => Ok(Template::new("broken", "Week {week}", "Hi {name}")),
        other => by_category(other),
    };
    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, classified(3), &shared), templates)
        .await
        .unwrap();

    assert_eq!(summary.recipients, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    let sent_to: Vec<String> = channel.calls().into_iter().map(|(to, _)| to).collect();
    assert_eq!(sent_to, vec!["ana@school.edu", "cy@school.edu"]);

    let records = log.records();
    let failed = &records[1];
    assert_eq!(failed.recipient, "Bo");
    assert!(failed.outcome.starts_with("render failed:"));
    assert!(failed.outcome.contains("week"));
}

#[tokio::test]
async fn invalid_and_missing_addresses_are_distinct_outcomes() {
    let channel = ScriptedChannel::default();
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let mut fay = recipient("Fay", 0, 2, &[]);
    fay.rejected_addresses = vec!["fay@".into()];
    let recipients = vec![fay];
    let shared = Variables::new();

    let summary = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, classified(2), &shared), by_category)
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert!(channel.calls().is_empty());
    let outcomes: Vec<String> = log.records().into_iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec!["invalid address: fay@", "no valid address"]);
}

#[tokio::test]
async fn unready_channel_aborts_before_any_send() {
    let channel = ScriptedChannel {
        not_ready: true,
        ..ScriptedChannel::default()
    };
    let log = MemoryOutcomeLog::new();
    let pacer = RecordingPacer::default();
    let recipients = vec![recipient("Ana", 0, 3, &["ana@school.edu"])];
    let shared = Variables::new();

    let err = Dispatcher::new(&channel, &log)
        .settings(settings(0))
        .pacer(&pacer)
        .dispatch_all(&request(&recipients, classified(3), &shared), by_category)
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(channel.calls().is_empty());
    assert!(log.is_empty());
    assert!(pacer.pauses().is_empty());
}

#[test]
fn preview_renders_without_sending() {
    let recipients = vec![
        recipient("Ana", 0, 3, &["ana@school.edu"]),
        recipient("Bo", 3, 3, &["bo@school.edu"]),
    ];
    let shared = Variables::new();
    let items = preview(&request(&recipients, classified(3), &shared), by_category);

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].category, Some(Category::None));
    assert_eq!(
        items[1].message.as_ref().map(|m| m.subject.as_str()),
        Ok("Well done Bo")
    );
    assert_eq!(
        items[1].message.as_ref().map(|m| m.body.as_str()),
        Ok("All 3 in.")
    );
}
