use crate::error::{EngineError, Result};
use crate::models::AnalysisRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Durable key/value storage for profiles, one record per subject.
///
/// Values are opaque serialized profiles; parsing (and tolerating garbage) is
/// the profile store's job. Every call is synchronous and reports failure
/// explicitly.
pub trait ProfileStorage: Send + Sync {
    fn load_profile(&self, subject: &str) -> Result<Option<String>>;

    /// Store `value` together with the profile version it was issued as.
    fn save_profile(&self, subject: &str, value: &str, version: u64) -> Result<()>;

    /// Highest profile version stored for the subject, 0 when none.
    fn profile_version(&self, subject: &str) -> Result<u64>;

    /// Append a successful analysis to the subject's history.
    fn record_analysis(&self, subject: &str, record: &AnalysisRecord) -> Result<()>;

    /// Analysis history, newest first.
    fn list_analyses(&self, subject: &str) -> Result<Vec<AnalysisRecord>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============ SQLite ============

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            -- Latest submitted profile per subject
            CREATE TABLE IF NOT EXISTS profiles (
                subject TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Every successful analysis, kept for history
            CREATE TABLE IF NOT EXISTS career_analyses (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                result_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_subject ON career_analyses(subject);
            ",
        )?;

        // Migration: profiles written before versions were persisted
        let has_version: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('profiles') WHERE name='version'",
            [],
            |row| row.get(0),
        )?;
        if has_version == 0 {
            conn.execute(
                "ALTER TABLE profiles ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = lock(&self.conn);
        f(&conn).map_err(EngineError::from)
    }
}

impl ProfileStorage for SqliteStorage {
    fn load_profile(&self, subject: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT payload FROM profiles WHERE subject = ?1",
                params![subject],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn save_profile(&self, subject: &str, value: &str, version: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let version = i64::try_from(version)
            .map_err(|_| EngineError::storage(format!("profile version {} out of range", version)))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO profiles (subject, payload, version, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(subject) DO UPDATE SET payload = excluded.payload,
                     version = excluded.version, updated_at = excluded.updated_at",
                params![subject, value, version, now],
            )?;
            Ok(())
        })
    }

    fn profile_version(&self, subject: &str) -> Result<u64> {
        let stored: Option<i64> = self.with_connection(|conn| {
            conn.query_row(
                "SELECT version FROM profiles WHERE subject = ?1",
                params![subject],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(stored.map_or(0, |v| u64::try_from(v).unwrap_or(0)))
    }

    fn record_analysis(&self, subject: &str, record: &AnalysisRecord) -> Result<()> {
        let result_json = serde_json::to_string(&record.paths)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO career_analyses (id, subject, result_json, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, subject, result_json, record.created_at],
            )?;
            Ok(())
        })
    }

    fn list_analyses(&self, subject: &str) -> Result<Vec<AnalysisRecord>> {
        let rows: Vec<(String, String, String)> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, result_json, created_at FROM career_analyses
                 WHERE subject = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map(params![subject], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect()
        })?;

        // Rows whose JSON no longer parses are skipped rather than failing the listing
        Ok(rows
            .into_iter()
            .filter_map(|(id, json, created_at)| {
                serde_json::from_str(&json).ok().map(|paths| AnalysisRecord {
                    id,
                    created_at,
                    paths,
                })
            })
            .collect())
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryStorage {
    /// subject -> (payload, version)
    profiles: Mutex<HashMap<String, (String, u64)>>,
    analyses: Mutex<HashMap<String, Vec<AnalysisRecord>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw stored value, e.g. to simulate an older or damaged record.
    /// Seeded records carry no version, like rows written before versions
    /// were persisted.
    pub fn with_profile(self, subject: &str, value: &str) -> Self {
        lock(&self.profiles).insert(subject.to_string(), (value.to_string(), 0));
        self
    }
}

impl ProfileStorage for InMemoryStorage {
    fn load_profile(&self, subject: &str) -> Result<Option<String>> {
        Ok(lock(&self.profiles).get(subject).map(|(payload, _)| payload.clone()))
    }

    fn save_profile(&self, subject: &str, value: &str, version: u64) -> Result<()> {
        lock(&self.profiles).insert(subject.to_string(), (value.to_string(), version));
        Ok(())
    }

    fn profile_version(&self, subject: &str) -> Result<u64> {
        Ok(lock(&self.profiles).get(subject).map_or(0, |(_, version)| *version))
    }

    fn record_analysis(&self, subject: &str, record: &AnalysisRecord) -> Result<()> {
        lock(&self.analyses)
            .entry(subject.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn list_analyses(&self, subject: &str) -> Result<Vec<AnalysisRecord>> {
        let mut records = lock(&self.analyses).get(subject).cloned().unwrap_or_default();
        records.reverse();
        Ok(records)
    }
}
