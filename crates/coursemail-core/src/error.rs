//! Error types for CourseMail.
//!
//! Only configuration-class errors ([`CourseMailError::Config`] and
//! [`CourseMailError::MissingColumns`]) are allowed to abort a dispatch run.
//! Everything per recipient or per address is turned into an outcome record.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CourseMailError>;

#[derive(Debug, Error)]
pub enum CourseMailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Roster error: {0}")]
    Roster(String),

    #[error("Template error: {0}")]
    Render(#[from] RenderError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CourseMailError {
    /// Errors detected before any send that abort the whole run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingColumns(_))
    }
}

/// Template rendering failure. Rendering is all-or-nothing: when this is
/// returned no substituted text exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing variable '{0}'")]
    MissingVariable(String),

    #[error("unmatched '{brace}' at byte {position}")]
    UnmatchedBrace { brace: char, position: usize },

    #[error("invalid placeholder '{{{0}}}'")]
    InvalidPlaceholder(String),
}

/// Failure reported by a delivery channel for one address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Connection drops, timeouts, 4xx replies. Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// Malformed address or a permanent relay rejection. Never retried.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The underlying message without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(d) | Self::Rejected(d) => d,
        }
    }
}
