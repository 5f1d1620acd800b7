//! SQLite outcome log — append-only delivery history.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use coursemail_core::error::{CourseMailError, Result};
use coursemail_core::traits::OutcomeLog;
use coursemail_core::OutcomeRecord;
use rusqlite::{params, Connection};

use crate::{open_connection, store_err};

pub struct SqliteOutcomeLog {
    conn: Mutex<Connection>,
}

impl SqliteOutcomeLog {
    /// Open or create the history table in the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                recipient TEXT NOT NULL,
                outcome TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outcomes_timestamp ON outcomes(timestamp);",
        )
        .map_err(store_err("Migration"))?;
        tracing::debug!("History database ready: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CourseMailError::Store("history connection poisoned".into()))
    }

    /// Total rows in the history.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM outcomes", [], |r| r.get(0))
            .map_err(store_err("Count history"))?;
        Ok(n as usize)
    }
}

impl OutcomeLog for SqliteOutcomeLog {
    fn append(&self, record: &OutcomeRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO outcomes (timestamp, subject, recipient, outcome) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.timestamp.to_rfc3339(),
                record.subject,
                record.recipient,
                record.outcome,
            ],
        )
        .map_err(store_err("Append outcome"))?;
        Ok(())
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<OutcomeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, subject, recipient, outcome FROM outcomes
                 ORDER BY id DESC LIMIT ?1",
            )
            .map_err(store_err("Query history"))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(store_err("Query history"))?;

        let mut records = Vec::new();
        for row in rows {
            let (ts, subject, recipient, outcome) = row.map_err(store_err("Read history row"))?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| CourseMailError::Store(format!("Bad timestamp '{ts}': {e}")))?;
            records.push(OutcomeRecord {
                timestamp,
                subject,
                recipient,
                outcome,
            });
        }
        Ok(records)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM outcomes", [])
            .map_err(store_err("Clear history"))?;
        tracing::info!("🗑️ Cleared {removed} history record(s)");
        Ok(())
    }
}
