//! Structured logging module for Career Compass
//!
//! Writes logs to the configured log directory with categories:
//! - PROFILE: Profile loads, edits and saves
//! - ANALYSIS: Analysis dispatch, coalescing and stale discards
//! - SEARCH: Career search dispatch and supersession
//! - NAVIGATION: View transitions and guard violations
//! - SESSION: Login challenge lifecycle
//! - ERROR: Errors

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Profile,
    Analysis,
    Search,
    Navigation,
    Session,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Profile => "PROFILE",
            LogCategory::Analysis => "ANALYSIS",
            LogCategory::Search => "SEARCH",
            LogCategory::Navigation => "NAVIGATION",
            LogCategory::Session => "SESSION",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Log directory; `None` until `init_logging` runs (console only).
static LOG_DIR: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

fn log_dir() -> Option<PathBuf> {
    LOG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn log_file_path(dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    dir.join(format!("career-compass-{}.log", today))
}

/// Initialize the logging system - creates the log directory if needed
pub fn init_logging(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    *LOG_DIR.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(dir.to_path_buf());

    log(LogCategory::Session, None, "Career Compass logging initialized");
    Ok(())
}

/// Render one log line. Subject ids are shortened to keep lines scannable.
fn format_line(category: LogCategory, subject: Option<&str>, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let subject_context = subject
        .map(|id| {
            let short: String = id.chars().take(12).collect();
            format!("subject={} | ", short)
        })
        .unwrap_or_default();

    format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        subject_context,
        message
    )
}

/// Log a message with category and optional subject context
pub fn log(category: LogCategory, subject: Option<&str>, message: &str) {
    let line = format_line(category, subject, message);

    print!("{}", line);

    if let Some(dir) = log_dir() {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path(&dir))
        {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

pub fn log_profile(subject: Option<&str>, message: &str) {
    log(LogCategory::Profile, subject, message);
}

pub fn log_analysis(subject: Option<&str>, message: &str) {
    log(LogCategory::Analysis, subject, message);
}

pub fn log_search(subject: Option<&str>, message: &str) {
    log(LogCategory::Search, subject, message);
}

pub fn log_navigation(subject: Option<&str>, message: &str) {
    log(LogCategory::Navigation, subject, message);
}

pub fn log_session(subject: Option<&str>, message: &str) {
    log(LogCategory::Session, subject, message);
}

pub fn log_error(subject: Option<&str>, message: &str) {
    log(LogCategory::Error, subject, message);
}

/// Remove log files older than `retention_days` from `dir`
pub fn cleanup_old_logs(dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let mut deleted = 0;

    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().map(|ext| ext == "log").unwrap_or(false);
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}
