//! Operator-edited templates, one row per (profile, key).
//!
//! Keys are template kinds (`pending_work`) or week variants
//! (`pending_work_week_3`). Saving an existing key replaces it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use coursemail_core::error::{CourseMailError, Result};
use coursemail_core::Template;
use coursemail_templates::TemplateOverrides;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{open_connection, store_err};

/// A stored override as listed by `templates list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTemplate {
    pub profile: String,
    pub key: String,
    pub template: Template,
    pub updated_at: String,
}

pub struct TemplateStore {
    conn: Mutex<Connection>,
}

impl TemplateStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(profile, kind)
            );",
        )
        .map_err(store_err("Migration"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CourseMailError::Store("template connection poisoned".into()))
    }

    /// Insert or replace the override for `(profile, key)`.
    pub fn set(&self, profile: &str, key: &str, template: &Template) -> Result<()> {
        self.set_at(profile, key, template, Utc::now())
    }

    fn set_at(&self, profile: &str, key: &str, template: &Template, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO templates (profile, kind, name, subject, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile,
                key,
                template.name,
                template.subject,
                template.body,
                at.to_rfc3339()
            ],
        )
        .map_err(store_err("Save template"))?;
        tracing::info!("💾 Template saved: {profile}/{key}");
        Ok(())
    }

    pub fn get(&self, profile: &str, key: &str) -> Result<Option<Template>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT name, subject, body FROM templates WHERE profile = ?1 AND kind = ?2",
            params![profile, key],
            |row| {
                Ok(Template {
                    name: row.get(0)?,
                    subject: row.get(1)?,
                    body: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(store_err("Load template"))
    }

    /// Drop an override so the built-in applies again. Returns whether a
    /// row existed.
    pub fn reset(&self, profile: &str, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM templates WHERE profile = ?1 AND kind = ?2",
                params![profile, key],
            )
            .map_err(store_err("Reset template"))?;
        Ok(removed > 0)
    }

    /// Stored overrides, optionally for one profile, ordered by profile and key.
    pub fn list(&self, profile: Option<&str>) -> Result<Vec<StoredTemplate>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT profile, kind, name, subject, body, updated_at FROM templates
                 WHERE ?1 IS NULL OR profile = ?1
                 ORDER BY profile, kind",
            )
            .map_err(store_err("List templates"))?;
        let rows = stmt
            .query_map(params![profile], |row| {
                Ok(StoredTemplate {
                    profile: row.get(0)?,
                    key: row.get(1)?,
                    template: Template {
                        name: row.get(2)?,
                        subject: row.get(3)?,
                        body: row.get(4)?,
                    },
                    updated_at: row.get(5)?,
                })
            })
            .map_err(store_err("List templates"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("List templates"))
    }
}

impl TemplateOverrides for TemplateStore {
    fn get_override(&self, profile: &str, key: &str) -> Result<Option<Template>> {
        self.get(profile, key)
    }
}
