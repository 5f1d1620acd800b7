//! CourseMail configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CourseMailError, Result};

/// Environment variable that overrides `smtp.password`.
pub const PASSWORD_ENV: &str = "COURSEMAIL_SMTP_PASSWORD";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourseMailConfig {
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Shared template variables merged into every render.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<CourseProfile>,
}

impl CourseMailConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CourseMailError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CourseMailError::Config(format!("Failed to parse config: {e}")))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CourseMailError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CourseMail home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".coursemail")
    }

    /// Look up a profile by id. `default` falls back to the built-in
    /// gradebook profile when the config does not define one.
    pub fn profile(&self, id: &str) -> Option<CourseProfile> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .or_else(|| (id == "default").then(CourseProfile::default))
    }

    /// Ids of all selectable profiles.
    pub fn profile_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.iter().map(|p| p.id.clone()).collect();
        if !ids.iter().any(|id| id == "default") {
            ids.insert(0, "default".into());
        }
        ids
    }
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    /// Defaults by `tls` mode: 587 starttls, 465 tls, 25 none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// "starttls" (default), "tls", or "none".
    #[serde(default = "default_tls")]
    pub tls: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address. Defaults to `username` when empty.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_tls() -> String { "starttls".into() }
fn default_smtp_timeout() -> u64 { 30 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: None,
            tls: default_tls(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            display_name: None,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

impl SmtpConfig {
    /// Configured port, or the standard submission port for the TLS mode.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.tls.as_str() {
            "tls" => 465,
            "none" => 25,
            _ => 587,
        })
    }

    /// Password with the environment override applied.
    pub fn resolved_password(&self) -> String {
        std::env::var(PASSWORD_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.password.clone())
    }

    /// Sender address, falling back to the login name.
    pub fn sender(&self) -> &str {
        if self.from.trim().is_empty() {
            self.username.trim()
        } else {
            self.from.trim()
        }
    }
}

/// Retry, pacing, and batching knobs for dispatch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Attempt n waits n × this before the next try.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Wait after every recipient.
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,
    /// Wait between two addresses of the same recipient.
    #[serde(default = "default_address_gap")]
    pub address_gap_ms: u64,
    /// Recipients per batch; 0 disables batch pauses.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause")]
    pub batch_pause_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base() -> u64 { 3 }
fn default_pacing() -> u64 { 1000 }
fn default_address_gap() -> u64 { 800 }
fn default_batch_size() -> usize { 50 }
fn default_batch_pause() -> u64 { 15 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            pacing_ms: default_pacing(),
            address_gap_ms: default_address_gap(),
            batch_size: default_batch_size(),
            batch_pause_secs: default_batch_pause(),
        }
    }
}

/// Local record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.coursemail/coursemail.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

/// Column layout of one course's gradebook export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_first_name_column")]
    pub first_name_column: String,
    #[serde(default = "default_last_name_column")]
    pub last_name_column: Option<String>,
    /// Columns that may hold an address, in send order.
    #[serde(default = "default_address_columns")]
    pub address_columns: Vec<String>,
    /// Graded activity columns, in course order.
    #[serde(default)]
    pub activity_columns: Vec<String>,
    /// Display names matching `activity_columns`; derived from headers when empty.
    #[serde(default)]
    pub activity_names: Vec<String>,
    /// Course or module name exposed to templates as `{module}`.
    #[serde(default)]
    pub module: String,
}

fn default_first_name_column() -> String { "First name".into() }
fn default_last_name_column() -> Option<String> { Some("Last name".into()) }
fn default_address_columns() -> Vec<String> { vec!["Email address".into()] }

impl Default for CourseProfile {
    fn default() -> Self {
        Self {
            id: "default".into(),
            display_name: "Gradebook export".into(),
            first_name_column: default_first_name_column(),
            last_name_column: default_last_name_column(),
            address_columns: default_address_columns(),
            activity_columns: Vec::new(),
            activity_names: Vec::new(),
            module: String::new(),
        }
    }
}
