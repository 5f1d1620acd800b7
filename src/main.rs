//! # CourseMail — progress follow-up mail for course cohorts
//!
//! Reads a gradebook export, classifies each student by completed
//! activities, renders the matching template, and sends it over SMTP with
//! retry, pacing, and batch pauses.
//!
//! Usage:
//!   coursemail config init                         # Write a starter config
//!   coursemail preview --roster grades.csv --required 3 --week 2
//!   coursemail send --roster grades.csv --required 3 --week 2 --attach guide.pdf
//!   coursemail send --roster grades.csv --broadcast
//!   coursemail send --roster grades.csv --required 3 --week 2 --row 4 --to me@school.edu
//!   coursemail history --limit 20

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use coursemail_channels::SmtpChannel;
use coursemail_core::config::{CourseMailConfig, CourseProfile, PASSWORD_ENV};
use coursemail_core::traits::OutcomeLog;
use coursemail_core::{Attachment, Category, Template};
use coursemail_dispatch::{
    preview, unresolved_variables, DispatchRequest, DispatchSettings, Dispatcher, RecipientReport,
    RunMode, StopSignal,
};
use coursemail_roster::{classify, group_by_category, is_valid_address, load_roster, ProfileLayout};
use coursemail_store::{SqliteOutcomeLog, TemplateStore};
use coursemail_templates::{required_variables, TemplateCatalog, TemplateKind, Variables};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "coursemail",
    version,
    about = "📬 CourseMail — progress-classified course mail over SMTP"
)]
struct Cli {
    /// Config file (default: ~/.coursemail/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message per recipient in the roster
    Send {
        #[command(flatten)]
        selection: Selection,

        /// File attached to every message (repeatable)
        #[arg(long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,
    },
    /// Render every message without sending
    Preview {
        #[command(flatten)]
        selection: Selection,

        /// Print full bodies, not just subjects
        #[arg(long)]
        full: bool,
    },
    /// Show or clear the delivery history
    History {
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Delete all history records
        #[arg(long)]
        clear: bool,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Manage stored template overrides
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct Selection {
    /// Gradebook export (CSV)
    #[arg(short, long)]
    roster: PathBuf,

    /// Course profile id
    #[arg(short, long, default_value = "default")]
    profile: String,

    /// Activities required for "complete"
    #[arg(long, conflicts_with = "broadcast", required_unless_present = "broadcast")]
    required: Option<u32>,

    /// Same welcome template for everyone; no classification
    #[arg(long)]
    broadcast: bool,

    /// Course week, exposed as {week} and used for week-specific templates
    #[arg(short, long)]
    week: Option<u32>,

    /// List every pending activity, not only the first --required ones
    #[arg(long)]
    list_all_missing: bool,

    /// Extra template variable (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Only recipients in this category
    #[arg(long, conflicts_with = "broadcast")]
    only: Option<Category>,

    /// Only the recipient on this data row (as numbered by preview)
    #[arg(long, conflicts_with = "name")]
    row: Option<usize>,

    /// Only recipients with this first or full name (case-insensitive)
    #[arg(long)]
    name: Option<String>,

    /// Deliver the selected recipient's message here instead (test send)
    #[arg(long, value_name = "ADDRESS")]
    to: Option<String>,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Built-in kinds and stored overrides for a profile
    List {
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Print the template a run would use
    Show {
        kind: TemplateKind,
        #[arg(short, long, default_value = "default")]
        profile: String,
        #[arg(short, long)]
        week: Option<u32>,
    },
    /// Store an override
    Set {
        kind: TemplateKind,
        #[arg(short, long, default_value = "default")]
        profile: String,
        /// Store as the variant for this week only
        #[arg(short, long)]
        week: Option<u32>,
        #[arg(long)]
        subject: String,
        /// Body text
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,
        /// Read the body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Label shown in listings
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove an override so the built-in applies again
    Reset {
        kind: TemplateKind,
        #[arg(short, long, default_value = "default")]
        profile: String,
        #[arg(short, long)]
        week: Option<u32>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config (password masked)
    Show,
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "coursemail=debug"
    } else {
        "coursemail=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(CourseMailConfig::default_path);

    match cli.command {
        Commands::Config { action } => run_config(action, &config_path),
        command => {
            let config = load_config(&config_path)?;
            match command {
                Commands::Send {
                    selection,
                    attachments,
                } => run_send(&config, &selection, &attachments).await,
                Commands::Preview { selection, full } => run_preview(&config, &selection, full),
                Commands::History { limit, clear, json } => run_history(&config, limit, clear, json),
                Commands::Templates { action } => run_templates(&config, action),
                Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn load_config(path: &Path) -> Result<CourseMailConfig> {
    if path.exists() {
        Ok(CourseMailConfig::load_from(path)?)
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Ok(CourseMailConfig::default())
    }
}

// ─── send / preview ───────────────────────────────────────

/// Everything a send or preview run needs, resolved from flags + config.
struct Plan {
    profile: CourseProfile,
    recipients: Vec<coursemail_core::Recipient>,
    mode: RunMode,
    shared: Variables,
    week: Option<u32>,
}

fn plan(config: &CourseMailConfig, sel: &Selection) -> Result<Plan> {
    let Some(profile) = config.profile(&sel.profile) else {
        bail!(
            "Unknown profile '{}'. Available: {}",
            sel.profile,
            config.profile_ids().join(", ")
        );
    };
    let layout = ProfileLayout::new(profile.clone());
    let roster = load_roster(&sel.roster, &layout)?;
    if !roster.absent_activity_columns.is_empty() {
        println!(
            "⚠️  {} activity column(s) not in the file; counted as not completed",
            roster.absent_activity_columns.len()
        );
    }

    let mode = match sel.required {
        Some(required_count) if !sel.broadcast => {
            if required_count == 0 {
                tracing::warn!("⚠️ --required 0 classifies every student with any progress as complete");
            }
            RunMode::Classified {
                required_count,
                list_all_missing: sel.list_all_missing,
            }
        }
        _ => RunMode::Broadcast,
    };

    let mut recipients = roster.recipients;
    if let (Some(only), RunMode::Classified { required_count, .. }) = (sel.only, mode) {
        recipients.retain(|r| classify(r.progress_count(), required_count) == only);
    }
    if let Some(row) = sel.row {
        recipients.retain(|r| r.row == row);
        if recipients.is_empty() {
            bail!("No selected recipient on row {row}");
        }
    }
    if let Some(name) = &sel.name {
        let wanted = name.trim().to_lowercase();
        recipients.retain(|r| {
            r.full_name().to_lowercase() == wanted || r.first_name.trim().to_lowercase() == wanted
        });
        if recipients.is_empty() {
            bail!("No selected recipient named '{name}'");
        }
    }
    if let Some(to) = &sel.to {
        if recipients.len() != 1 {
            bail!(
                "--to needs --row or --name to select exactly one recipient ({} selected)",
                recipients.len()
            );
        }
        if !is_valid_address(to) {
            bail!("Invalid --to address '{to}'");
        }
        let picked = &mut recipients[0];
        println!("🧪 Test send: message for {} goes to {to}", picked.full_name());
        picked.addresses = vec![to.trim().to_string()];
        picked.rejected_addresses.clear();
    }

    let mut shared = Variables::new();
    if !profile.module.is_empty() {
        shared.insert("module".into(), profile.module.clone());
    }
    shared.extend(config.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(week) = sel.week {
        shared.insert("week".into(), week.to_string());
    }
    shared.extend(sel.vars.iter().cloned());

    Ok(Plan {
        profile,
        recipients,
        mode,
        shared,
        week: sel.week,
    })
}

fn template_for<'a>(
    catalog: &'a TemplateCatalog<'a, TemplateStore>,
    week: Option<u32>,
) -> impl Fn(Option<Category>) -> coursemail_core::Result<Template> + 'a {
    move |category| match category {
        Some(c) => catalog.for_category(c, week),
        None => catalog.resolve(TemplateKind::Welcome, week),
    }
}

async fn run_send(config: &CourseMailConfig, sel: &Selection, attachment_paths: &[PathBuf]) -> Result<()> {
    let plan = plan(config, sel)?;
    let attachments = attachment_paths
        .iter()
        .map(|p| Attachment::from_path(p).with_context(|| format!("reading attachment {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let db_path = config.store.resolved_path();
    let store = TemplateStore::open(&db_path)?;
    let catalog = TemplateCatalog::new(&store, &plan.profile.id);
    let request = DispatchRequest {
        recipients: &plan.recipients,
        mode: plan.mode,
        shared: &plan.shared,
        attachments: &attachments,
    };

    let unresolved = unresolved_variables(&request, template_for(&catalog, plan.week))?;
    if !unresolved.is_empty() {
        for (template, names) in &unresolved {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            println!("❌ Template '{template}' needs: {}", names.join(", "));
        }
        bail!("Unresolved template variables; supply them with --week, --var KEY=VALUE, or [variables]");
    }

    let channel = SmtpChannel::from_config(&config.smtp)?;
    let log = SqliteOutcomeLog::open(&db_path)?;

    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Stopping after the current recipient...");
            ctrl_c.stop();
        }
    });

    println!(
        "📬 Sending to {} recipient(s) — profile '{}'",
        plan.recipients.len(),
        plan.profile.id
    );
    let summary = Dispatcher::new(&channel, &log)
        .settings(DispatchSettings::from(&config.dispatch))
        .stop_signal(stop)
        .on_recipient(print_report)
        .dispatch_all(&request, template_for(&catalog, plan.week))
        .await?;

    println!();
    println!("✅ Sent:      {}", summary.succeeded);
    println!("❌ Failed:    {}", summary.failed);
    println!("🔁 Retries:   {}", summary.retries);
    println!("👥 Processed: {}/{}", summary.recipients, plan.recipients.len());
    if summary.stopped_early {
        println!("🛑 Stopped early; remaining recipients were not contacted.");
    }
    if summary.failed > 0 {
        println!("   Details: coursemail history --limit {}", summary.attempted);
    }
    Ok(())
}

fn print_report(report: &RecipientReport<'_>) {
    let sent = report.outcomes.iter().filter(|o| o.succeeded).count();
    let category = report.category.map(|c| format!(" ({c})")).unwrap_or_default();
    let marker = if sent == report.outcomes.len() { "✅" } else { "⚠️ " };
    println!(
        "{marker} [{}/{}] {}{category}: {sent}/{} delivered",
        report.index,
        report.total,
        report.name,
        report.outcomes.len()
    );
    for failed in report.outcomes.iter().filter(|o| !o.succeeded) {
        println!("     {} — {}", failed.recipient, failed.describe());
    }
}

fn run_preview(config: &CourseMailConfig, sel: &Selection, full: bool) -> Result<()> {
    let plan = plan(config, sel)?;
    let store = TemplateStore::open(&config.store.resolved_path())?;
    let catalog = TemplateCatalog::new(&store, &plan.profile.id);
    let request = DispatchRequest {
        recipients: &plan.recipients,
        mode: plan.mode,
        shared: &plan.shared,
        attachments: &[],
    };

    let items = preview(&request, template_for(&catalog, plan.week));
    let mut failures = 0;
    for item in &items {
        let category = item.category.map(|c| format!(" [{c}]")).unwrap_or_default();
        let to = if item.addresses.is_empty() {
            "no valid address".to_string()
        } else {
            item.addresses.join(", ")
        };
        println!("── row {}: {}{category} → {to}", item.row, item.name);
        for bad in &item.rejected_addresses {
            println!("   ⚠️  invalid address skipped: {bad}");
        }
        match &item.message {
            Ok(message) => {
                println!("   Subject: {}", message.subject);
                if full {
                    for line in message.body.lines() {
                        println!("   │ {line}");
                    }
                }
            }
            Err(e) => {
                failures += 1;
                println!("   ❌ {e}");
            }
        }
    }
    println!("\n📋 {} message(s) previewed, {failures} render failure(s)", items.len());
    if let RunMode::Classified { required_count, .. } = plan.mode {
        let (complete, partial, none) = group_by_category(&plan.recipients, required_count);
        println!(
            "   complete: {}  partial: {}  none: {}",
            complete.len(),
            partial.len(),
            none.len()
        );
    }
    Ok(())
}

// ─── history ──────────────────────────────────────────────

fn run_history(config: &CourseMailConfig, limit: usize, clear: bool, json: bool) -> Result<()> {
    let log = SqliteOutcomeLog::open(&config.store.resolved_path())?;
    if clear {
        log.clear()?;
        println!("🗑️  History cleared");
        return Ok(());
    }

    let records = log.query_recent(limit)?;
    if records.is_empty() {
        println!("No deliveries recorded yet.");
        return Ok(());
    }
    if !json {
        println!("📜 Latest {} of {} record(s)", records.len(), log.count()?);
    }
    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            let marker = if record.succeeded() { "✅" } else { "❌" };
            println!(
                "{marker} {}  {}  {}  {}",
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.recipient,
                record.subject,
                record.outcome
            );
        }
    }
    Ok(())
}

// ─── templates ────────────────────────────────────────────

fn template_key(kind: TemplateKind, week: Option<u32>) -> String {
    week.map(|w| kind.week_key(w))
        .unwrap_or_else(|| kind.key().to_string())
}

fn run_templates(config: &CourseMailConfig, action: TemplateAction) -> Result<()> {
    let store = TemplateStore::open(&config.store.resolved_path())?;
    match action {
        TemplateAction::List { profile } => {
            println!("Built-in kinds:");
            for kind in TemplateKind::ALL {
                println!("  {:<16} {}", kind.key(), kind.builtin().name);
            }
            let stored = store.list(profile.as_deref())?;
            if stored.is_empty() {
                println!("\nNo stored overrides.");
            } else {
                println!("\nStored overrides:");
                for s in stored {
                    println!(
                        "  {}/{:<24} {}  (updated {})",
                        s.profile, s.key, s.template.name, s.updated_at
                    );
                }
            }
        }
        TemplateAction::Show { kind, profile, week } => {
            let template = TemplateCatalog::new(&store, &profile).resolve(kind, week)?;
            let vars: Vec<String> = required_variables(&template)?.into_iter().collect();
            println!("Name:      {}", template.name);
            println!("Subject:   {}", template.subject);
            println!("Variables: {}", vars.join(", "));
            println!();
            println!("{}", template.body);
        }
        TemplateAction::Set {
            kind,
            profile,
            week,
            subject,
            body,
            body_file,
            name,
        } => {
            let body = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => bail!("--body or --body-file is required"),
            };
            let key = template_key(kind, week);
            let template = Template {
                name: name.unwrap_or_else(|| key.clone()),
                subject,
                body,
            };
            let vars = required_variables(&template)?;
            store.set(&profile, &key, &template)?;
            println!("💾 Saved {profile}/{key}");
            println!("   Variables: {}", vars.into_iter().collect::<Vec<_>>().join(", "));
        }
        TemplateAction::Reset { kind, profile, week } => {
            let key = template_key(kind, week);
            if store.reset(&profile, &key)? {
                println!("↩️  {profile}/{key} reset to built-in");
            } else {
                println!("No override stored for {profile}/{key}");
            }
        }
    }
    Ok(())
}

// ─── config ───────────────────────────────────────────────

fn run_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = load_config(path)?;
            if !config.smtp.password.is_empty() {
                config.smtp.password = "********".into();
            }
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            if std::env::var(PASSWORD_ENV).is_ok_and(|v| !v.is_empty()) {
                println!("# smtp.password overridden by {PASSWORD_ENV}");
            }
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let mut config = CourseMailConfig::default();
            config.variables.insert("sender_name".into(), "Your Name".into());
            config.profiles.push(CourseProfile {
                id: "example".into(),
                display_name: "Example course".into(),
                address_columns: vec!["Personal email".into(), "Email address".into()],
                activity_columns: vec![
                    "Quiz:R1. First activity (Real)".into(),
                    "Assignment:R2. Second activity (Real)".into(),
                ],
                module: "Example module".into(),
                ..CourseProfile::default()
            });
            config.save_to(path)?;
            println!("✅ Config written to {}", path.display());
            println!("   Set smtp.username and smtp.password (or {PASSWORD_ENV}).");
            println!("   smtp.port defaults to 587 for starttls, 465 for tls, 25 for none.");
        }
    }
    Ok(())
}
