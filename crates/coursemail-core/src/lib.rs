//! # CourseMail Core
//!
//! Shared data model, error taxonomy, configuration, and the two seams the
//! dispatcher talks through: [`traits::DeliveryChannel`] and
//! [`traits::OutcomeLog`].
//!
//! ## Architecture
//! ```text
//! CSV export ──► roster (classify) ──► templates (render)
//!                                           │
//!                                           ▼
//!                      dispatch (retry, pacing, stop signal)
//!                           │                      │
//!                           ▼                      ▼
//!                  DeliveryChannel (SMTP)     OutcomeLog (SQLite)
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::CourseMailConfig;
pub use error::{CourseMailError, DeliveryError, RenderError, Result};
pub use traits::{DeliveryChannel, OutcomeLog};
pub use types::{
    ActivityMark, Attachment, Category, DispatchOutcome, DispatchSummary, OutcomeKind,
    OutcomeRecord, Recipient, RenderedMessage, Template,
};
