//! Analysis client adapter
//!
//! `CareerAdvisor` is the raw transport to whatever produces career paths.
//! `AnalysisClient` puts the uniform contract on top: local query validation,
//! a bounded timeout per call, and one error taxonomy. It never caches and
//! never retries.

use crate::error::{EngineError, Result};
use crate::models::{CareerPath, UserProfile};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Remote producer of career recommendations.
///
/// Implementations may fail however they like, but should report faults with
/// the `Network`/`Timeout`/`Upstream` variants of `EngineError`.
#[async_trait]
pub trait CareerAdvisor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recommend career paths for a complete profile.
    async fn analyze(&self, profile: &UserProfile) -> Result<Vec<CareerPath>>;

    /// Build a roadmap for one named career, personalized to the profile.
    async fn search(&self, profile: &UserProfile, query: &str) -> Result<Vec<CareerPath>>;
}

#[derive(Clone)]
pub struct AnalysisClient {
    advisor: Arc<dyn CareerAdvisor>,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(advisor: Arc<dyn CareerAdvisor>, timeout: Duration) -> Self {
        Self { advisor, timeout }
    }

    pub fn advisor_name(&self) -> &'static str {
        self.advisor.name()
    }

    /// Callers must pass a complete profile; it is not re-checked here.
    pub async fn analyze(&self, profile: &UserProfile) -> Result<Vec<CareerPath>> {
        self.bounded(self.advisor.analyze(profile)).await
    }

    pub async fn search(&self, profile: &UserProfile, query: &str) -> Result<Vec<CareerPath>> {
        let query = normalize_query(query)?;
        self.bounded(self.advisor.search(profile, query)).await
    }

    async fn bounded<F>(&self, call: F) -> Result<Vec<CareerPath>>
    where
        F: std::future::Future<Output = Result<Vec<CareerPath>>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(paths)) => Ok(paths),
            Ok(Err(e)) => Err(normalize(e)),
            Err(_) => Err(EngineError::timeout(format!(
                "{} did not answer within {}s",
                self.advisor.name(),
                self.timeout.as_secs_f32()
            ))),
        }
    }
}

/// Trimmed search query, or a validation error when nothing is left.
pub fn normalize_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("search query is empty"));
    }
    Ok(trimmed)
}

/// Keep the remote taxonomy closed: anything an advisor reports outside of it
/// counts as an upstream failure.
fn normalize(err: EngineError) -> EngineError {
    match err {
        EngineError::Network(_)
        | EngineError::Timeout(_)
        | EngineError::Upstream(_)
        | EngineError::Validation(_) => err,
        other => EngineError::upstream(other.to_string()),
    }
}
