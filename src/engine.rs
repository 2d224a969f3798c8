//! Engine facade
//!
//! `CareerCompass` wires the profile store, the view state machine and the
//! request coordinator for one authenticated subject. Methods take `&self` so an
//! `Arc<CareerCompass>` can be shared between tasks; locks are only held for
//! synchronous work and always released before awaiting the analysis service.

use crate::analysis::AnalysisClient;
use crate::config::EngineConfig;
use crate::coordinator::{AnalysisResult, RequestCoordinator, SearchResult};
use crate::db::{ProfileStorage, SqliteStorage};
use crate::error::{EngineError, Result};
use crate::gemini::GeminiClient;
use crate::logging;
use crate::models::{AnalysisRecord, CareerPath, ProfileField, ProfileVersion, UserProfile};
use crate::presentation::Theme;
use crate::profile_store::ProfileStore;
use crate::session::SessionGate;
use crate::view::{GuardViolation, ViewState, ViewStateMachine};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CareerCompass {
    subject: String,
    storage: Arc<dyn ProfileStorage>,
    store: Mutex<ProfileStore>,
    view: Mutex<ViewStateMachine>,
    coordinator: RequestCoordinator,
    theme: Mutex<Theme>,
    /// Last profile version written to analysis history
    recorded: Mutex<Option<ProfileVersion>>,
}

impl CareerCompass {
    /// Open the engine for the gate's authenticated subject.
    pub fn open(
        gate: &SessionGate,
        storage: Arc<dyn ProfileStorage>,
        client: AnalysisClient,
    ) -> Result<Self> {
        let subject = gate
            .subject()
            .ok_or_else(|| EngineError::session("sign in before opening the engine"))?
            .to_string();

        let store = ProfileStore::load(&subject, storage.clone());
        let view = ViewStateMachine::new(store.has_profile());
        logging::log_navigation(
            Some(&subject),
            &format!("Starting on {}", view.current().as_str()),
        );

        Ok(Self {
            coordinator: RequestCoordinator::new(&subject, client),
            subject,
            storage,
            store: Mutex::new(store),
            view: Mutex::new(view),
            theme: Mutex::new(Theme::default()),
            recorded: Mutex::new(None),
        })
    }

    /// Open with the SQLite store and Gemini client described by `config`.
    pub fn from_config(gate: &SessionGate, config: &EngineConfig) -> Result<Self> {
        let storage = SqliteStorage::open(&config.database_path())?;
        let gemini = GeminiClient::new(config)?;
        let client = AnalysisClient::new(Arc::new(gemini), config.request_timeout());
        Self::open(gate, Arc::new(storage), client)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    // ============ Profile ============

    pub fn profile(&self) -> Option<UserProfile> {
        lock(&self.store).get().cloned()
    }

    pub fn has_profile(&self) -> bool {
        lock(&self.store).has_profile()
    }

    pub fn profile_version(&self) -> Option<ProfileVersion> {
        lock(&self.store).version()
    }

    /// Name used to greet the user.
    pub fn greeting_name(&self) -> String {
        lock(&self.store)
            .get()
            .map(|p| p.first_name().to_string())
            .unwrap_or_else(|| "User".to_string())
    }

    pub fn draft(&self) -> UserProfile {
        lock(&self.store).draft().clone()
    }

    pub fn edit(&self, field: ProfileField, value: impl Into<String>) {
        lock(&self.store).edit(field, value);
    }

    pub fn set_picture(&self, mime: &str, bytes: &[u8]) -> Result<()> {
        lock(&self.store).set_picture(mime, bytes)
    }

    pub fn clear_picture(&self) {
        lock(&self.store).clear_picture();
    }

    pub fn discard_draft(&self) {
        lock(&self.store).discard_draft();
    }

    /// Submit the draft being edited.
    pub async fn submit_draft(&self) -> Result<AnalysisResult> {
        let draft = self.draft();
        self.submit_profile(draft).await
    }

    /// Validate, persist, move to the Analysis screen and request the analysis
    /// for the new version.
    ///
    /// An incomplete profile or a failed write returns an error and changes
    /// nothing: the stored profile, its version and the current screen stay as
    /// they were.
    pub async fn submit_profile(&self, profile: UserProfile) -> Result<AnalysisResult> {
        if let Err(e) = profile.ensure_complete() {
            logging::log_profile(Some(&self.subject), &format!("Submit rejected: {}", e));
            return Err(e);
        }

        let version = lock(&self.store).replace(profile.clone())?;
        let screen = lock(&self.view).profile_saved();
        logging::log_navigation(
            Some(&self.subject),
            &format!("Profile {} saved, showing {}", version, screen.as_str()),
        );

        self.run_analysis(&profile, version).await
    }

    // ============ Analysis & search ============

    fn current_profile(&self) -> Result<(UserProfile, ProfileVersion)> {
        let store = lock(&self.store);
        match (store.get(), store.version()) {
            (Some(profile), Some(version)) => Ok((profile.clone(), version)),
            _ => Err(EngineError::validation("no profile has been saved yet")),
        }
    }

    /// Request the analysis for the stored profile. Also serves as retry after
    /// a failure, and as the first request for a profile loaded at startup.
    pub async fn refresh_analysis(&self) -> Result<AnalysisResult> {
        let (profile, version) = self.current_profile()?;
        self.run_analysis(&profile, version).await
    }

    async fn run_analysis(&self, profile: &UserProfile, version: ProfileVersion) -> Result<AnalysisResult> {
        let result = self.coordinator.request_analysis(profile, version).await?;
        if let AnalysisResult::Ready { version: settled, paths } = &result {
            if *settled == version {
                self.record_history(version, paths.clone());
            }
        }
        Ok(result)
    }

    fn record_history(&self, version: ProfileVersion, paths: Vec<CareerPath>) {
        {
            let mut recorded = lock(&self.recorded);
            if *recorded == Some(version) {
                return;
            }
            *recorded = Some(version);
        }

        let record = AnalysisRecord::new(paths);
        if let Err(e) = self.storage.record_analysis(&self.subject, &record) {
            logging::log_error(
                Some(&self.subject),
                &format!("Could not record analysis {} in history: {}", record.id, e),
            );
        }
    }

    /// Run a career search against the stored profile.
    pub async fn search(&self, query: &str) -> Result<SearchResult> {
        let (profile, version) = self.current_profile()?;
        self.coordinator.request_search(&profile, version, query).await
    }

    pub fn analysis(&self) -> AnalysisResult {
        self.coordinator.analysis()
    }

    pub fn search_result(&self) -> SearchResult {
        self.coordinator.search()
    }

    pub fn subscribe_analysis(&self) -> watch::Receiver<AnalysisResult> {
        self.coordinator.subscribe_analysis()
    }

    pub fn subscribe_search(&self) -> watch::Receiver<SearchResult> {
        self.coordinator.subscribe_search()
    }

    /// Past analyses for this subject, newest first.
    pub fn history(&self) -> Result<Vec<AnalysisRecord>> {
        self.storage.list_analyses(&self.subject)
    }

    // ============ View ============

    pub fn view(&self) -> ViewState {
        lock(&self.view).current()
    }

    pub fn navigate(&self, target: ViewState) -> std::result::Result<ViewState, GuardViolation> {
        let has_profile = self.has_profile();
        lock(&self.view).navigate(target, has_profile)
    }

    pub fn theme(&self) -> Theme {
        *lock(&self.theme)
    }

    pub fn toggle_theme(&self) -> Theme {
        let mut theme = lock(&self.theme);
        *theme = theme.toggled();
        *theme
    }

    /// Sign out. In-flight results are discarded; stored data is kept.
    pub fn logout(self, gate: &mut SessionGate) {
        self.coordinator.reset();
        let has_profile = self.has_profile();
        lock(&self.view).reset(has_profile);
        gate.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{Reply, ScriptedAdvisor};
    use crate::db::InMemoryStorage;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{ava, path};
    use crate::profile_store::test_support::FlakyStorage;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn signed_in() -> SessionGate {
        let mut gate = SessionGate::new(Some("123456".to_string()));
        gate.begin("ava@example.com").unwrap();
        gate.verify("123456").unwrap();
        gate
    }

    fn engine(storage: Arc<dyn ProfileStorage>, advisor: &Arc<ScriptedAdvisor>) -> CareerCompass {
        let client = AnalysisClient::new(advisor.clone(), Duration::from_secs(30));
        CareerCompass::open(&signed_in(), storage, client).unwrap()
    }

    #[test]
    fn test_requires_authenticated_subject() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        let client = AnalysisClient::new(advisor, Duration::from_secs(30));
        let gate = SessionGate::new(None);

        let err = CareerCompass::open(&gate, Arc::new(InMemoryStorage::new()), client).err();
        assert!(matches!(err, Some(EngineError::Session(_))));
    }

    #[tokio::test]
    async fn test_ava_submits_first_profile() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        let paths = vec![path("Backend Engineer"), path("Data Engineer"), path("SRE")];
        advisor.push(Reply::now(Ok(paths.clone())));
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);
        assert_eq!(compass.view(), ViewState::Profile);

        let result = compass.submit_profile(ava()).await.unwrap();

        let v1 = compass.profile_version().unwrap();
        assert_eq!(v1.get(), 1);
        assert_eq!(advisor.analyze_count(), 1);
        assert_eq!(compass.view(), ViewState::Analysis);
        assert_eq!(result, AnalysisResult::Ready { version: v1, paths });
        assert_eq!(compass.greeting_name(), "Ava");
        assert_eq!(compass.history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_submit_changes_nothing() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);
        let mut profile = ava();
        profile.degree = "  ".to_string();

        let err = compass.submit_profile(profile).await.unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert!(compass.profile().is_none());
        assert_eq!(compass.view(), ViewState::Profile);
        assert_eq!(advisor.analyze_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_old_profile_and_screen() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let storage = Arc::new(FlakyStorage::default());
        let compass = engine(storage.clone(), &advisor);
        compass.submit_profile(ava()).await.unwrap();
        compass.navigate(ViewState::Profile).unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let mut changed = ava();
        changed.skills = "Rust".to_string();
        let err = compass.submit_profile(changed).await.unwrap_err();

        assert!(matches!(err, EngineError::Storage(_)));
        assert_eq!(compass.profile(), Some(ava()));
        assert_eq!(compass.profile_version().unwrap().get(), 1);
        assert_eq!(compass.view(), ViewState::Profile);
        assert_eq!(advisor.analyze_count(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_not_fatal() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let storage = Arc::new(FlakyStorage {
            inner: InMemoryStorage::new()
                .with_profile("ava@example.com", &serde_json::to_string(&ava()).unwrap()),
            ..Default::default()
        });
        storage.fail_writes.store(true, Ordering::SeqCst);
        let compass = engine(storage.clone(), &advisor);

        let result = compass.refresh_analysis().await.unwrap();

        assert!(result.paths().is_some());
        assert!(compass.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guarded_navigation() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);

        assert!(compass.navigate(ViewState::Search).is_err());
        assert_eq!(compass.view(), ViewState::Profile);

        compass.submit_profile(ava()).await.unwrap();
        assert_eq!(compass.navigate(ViewState::Search), Ok(ViewState::Search));
        assert_eq!(compass.navigate(ViewState::Analysis), Ok(ViewState::Analysis));
    }

    #[tokio::test]
    async fn test_stored_profile_opens_on_analysis() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let storage = InMemoryStorage::new()
            .with_profile("ava@example.com", &serde_json::to_string(&ava()).unwrap());
        let compass = engine(Arc::new(storage), &advisor);

        assert_eq!(compass.view(), ViewState::Analysis);
        assert_eq!(compass.analysis(), AnalysisResult::Idle);

        let result = compass.refresh_analysis().await.unwrap();
        assert!(result.paths().is_some());
        assert_eq!(advisor.analyze_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Err(EngineError::timeout("slow"))));
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);

        let failed = compass.submit_profile(ava()).await.unwrap();
        assert!(matches!(failed, AnalysisResult::Failed { error: ErrorKind::Timeout, .. }));
        assert!(compass.history().unwrap().is_empty());

        let retried = compass.refresh_analysis().await.unwrap();
        assert!(retried.paths().is_some());
        assert_eq!(compass.history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_needs_profile_and_query() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        advisor.push(Reply::now(Ok(vec![path("UX Designer")])));
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);

        assert!(matches!(
            compass.search("UX Designer").await,
            Err(EngineError::Validation(_))
        ));

        compass.submit_profile(ava()).await.unwrap();
        assert!(matches!(compass.search("").await, Err(EngineError::Validation(_))));

        let found = compass.search("  UX Designer ").await.unwrap();
        assert_eq!(found.query(), Some("UX Designer"));
        assert_eq!(advisor.search_count(), 1);
        assert!(compass.analysis().paths().is_some());
    }

    #[tokio::test]
    async fn test_draft_submission() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let compass = engine(Arc::new(InMemoryStorage::new()), &advisor);

        let profile = ava();
        for field in ProfileField::REQUIRED {
            compass.edit(field, profile.field(field).to_string());
        }
        compass.submit_draft().await.unwrap();

        assert_eq!(compass.profile(), Some(ava()));
    }

    #[tokio::test]
    async fn test_logout_keeps_stored_profile() {
        let advisor = Arc::new(ScriptedAdvisor::new());
        advisor.push(Reply::now(Ok(vec![path("Analyst")])));
        let storage = Arc::new(InMemoryStorage::new());
        let mut gate = signed_in();
        let client = AnalysisClient::new(advisor.clone(), Duration::from_secs(30));
        let compass = CareerCompass::open(&gate, storage.clone(), client).unwrap();
        compass.submit_profile(ava()).await.unwrap();
        assert_eq!(compass.toggle_theme(), Theme::Dark);

        compass.logout(&mut gate);
        assert!(!gate.is_authenticated());

        gate.begin("ava@example.com").unwrap();
        gate.verify("123456").unwrap();
        let client = AnalysisClient::new(advisor, Duration::from_secs(30));
        let reopened = CareerCompass::open(&gate, storage, client).unwrap();
        assert_eq!(reopened.profile(), Some(ava()));
        assert_eq!(reopened.view(), ViewState::Analysis);
        assert_eq!(reopened.theme(), Theme::Light);
    }
}
