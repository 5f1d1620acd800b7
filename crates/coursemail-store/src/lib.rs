//! # CourseMail Store
//!
//! Local persistence: the delivery history and operator-edited templates
//! live in one SQLite file; an in-memory log covers dry runs and tests.

pub mod memory;
pub mod sqlite;
pub mod templates;

pub use memory::MemoryOutcomeLog;
pub use sqlite::SqliteOutcomeLog;
pub use templates::{StoredTemplate, TemplateStore};

use std::path::Path;

use coursemail_core::error::{CourseMailError, Result};
use rusqlite::Connection;

/// Open (or create) the database file, creating parent directories.
pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Connection::open(path).map_err(|e| CourseMailError::Store(format!("DB open: {e}")))
}

pub(crate) fn store_err(context: &'static str) -> impl Fn(rusqlite::Error) -> CourseMailError {
    move |e| CourseMailError::Store(format!("{context}: {e}"))
}
