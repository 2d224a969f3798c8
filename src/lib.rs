mod analysis;
mod config;
mod coordinator;
mod db;
mod engine;
mod error;
mod gemini;
pub mod logging;
mod models;
mod presentation;
mod profile_store;
mod session;
mod view;

pub use analysis::{normalize_query, AnalysisClient, CareerAdvisor};
pub use config::EngineConfig;
pub use coordinator::{AnalysisResult, RequestCoordinator, SearchResult};
pub use db::{InMemoryStorage, ProfileStorage, SqliteStorage};
pub use engine::CareerCompass;
pub use error::{EngineError, ErrorKind, Result};
pub use gemini::{parse_career_paths, GeminiClient};
pub use models::{AnalysisRecord, CareerPath, ProfileField, ProfileVersion, RoadmapStep, UserProfile};
pub use presentation::{Accordion, Theme};
pub use profile_store::ProfileStore;
pub use session::{SessionGate, SessionState};
pub use view::{GuardViolation, ViewState, ViewStateMachine};

// ============ Initialization ============

/// Prepare the data and log directories, start file logging and prune old
/// log files. Logging problems are reported but never stop the engine.
pub fn init(config: &EngineConfig) -> Result<()> {
    config.validate()?;
    std::fs::create_dir_all(&config.data_dir)?;

    if let Err(e) = logging::init_logging(&config.log_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match logging::cleanup_old_logs(&config.log_dir, config.log_retention_days) {
        Ok(0) => {}
        Ok(removed) => logging::log_session(None, &format!("Removed {} old log files", removed)),
        Err(e) => logging::log_error(None, &format!("Log cleanup failed: {}", e)),
    }

    logging::log_session(
        None,
        &format!("Engine initialized, data in {}", config.data_dir.display()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_dir = dir.path().join("data");
        config.log_dir = dir.path().join("data").join("logs");

        init(&config).unwrap();

        assert!(config.data_dir.is_dir());
        assert!(config.log_dir.is_dir());
    }
}
