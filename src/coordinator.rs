//! Request coordinator
//!
//! Sequences calls to the analysis service. Each analysis call is tagged with
//! the profile version it was issued for; when it returns, its outcome is only
//! applied if the coordinator is still waiting on that same version. Anything
//! else is a stale response and is dropped. Duplicate requests for a version
//! that is already loading share the in-flight call.
//!
//! State lives in `tokio::sync::watch` channels so screens can observe it. No
//! lock is held across an `.await`.

use crate::analysis::{normalize_query, AnalysisClient};
use crate::error::{ErrorKind, Result};
use crate::logging;
use crate::models::{CareerPath, ProfileVersion, UserProfile};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisResult {
    Idle,
    Loading {
        version: ProfileVersion,
    },
    Ready {
        version: ProfileVersion,
        paths: Vec<CareerPath>,
    },
    Failed {
        version: ProfileVersion,
        error: ErrorKind,
        message: String,
    },
}

impl AnalysisResult {
    pub fn version(&self) -> Option<ProfileVersion> {
        match self {
            AnalysisResult::Idle => None,
            AnalysisResult::Loading { version }
            | AnalysisResult::Ready { version, .. }
            | AnalysisResult::Failed { version, .. } => Some(*version),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AnalysisResult::Loading { .. })
    }

    pub fn paths(&self) -> Option<&[CareerPath]> {
        match self {
            AnalysisResult::Ready { paths, .. } => Some(paths),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchResult {
    Idle,
    Loading {
        query: String,
    },
    Ready {
        query: String,
        paths: Vec<CareerPath>,
    },
    Failed {
        query: String,
        error: ErrorKind,
        message: String,
    },
}

impl SearchResult {
    pub fn query(&self) -> Option<&str> {
        match self {
            SearchResult::Idle => None,
            SearchResult::Loading { query }
            | SearchResult::Ready { query, .. }
            | SearchResult::Failed { query, .. } => Some(query),
        }
    }

    pub fn paths(&self) -> Option<&[CareerPath]> {
        match self {
            SearchResult::Ready { paths, .. } => Some(paths),
            _ => None,
        }
    }
}

/// Clears `Loading{version}` if the issuing request is dropped before its
/// response is applied, so later requests for that version issue a new call
/// instead of waiting on one that will never finish.
struct InFlight<'a> {
    state: &'a watch::Sender<AnalysisResult>,
    subject: &'a str,
    version: ProfileVersion,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let version = self.version;
        let cleared = self.state.send_if_modified(|state| {
            let waiting = matches!(&*state, AnalysisResult::Loading { version: v } if *v == version);
            if waiting {
                *state = AnalysisResult::Idle;
            }
            waiting
        });
        if cleared {
            logging::log_analysis(
                Some(self.subject),
                &format!("Analysis for {} abandoned by its caller", version),
            );
        }
    }
}

/// What to do with an analysis request, decided atomically against the state.
enum Dispatch {
    /// Older than the version the coordinator already tracks
    Stale,
    /// Same version already in flight
    Join,
    /// Same version already answered
    Cached,
    Issue,
}

pub struct RequestCoordinator {
    subject: String,
    client: AnalysisClient,
    analysis: watch::Sender<AnalysisResult>,
    search: watch::Sender<SearchResult>,
    /// Sequence number of the newest search; older completions are dropped
    search_seq: Mutex<u64>,
}

impl RequestCoordinator {
    pub fn new(subject: &str, client: AnalysisClient) -> Self {
        let (analysis, _) = watch::channel(AnalysisResult::Idle);
        let (search, _) = watch::channel(SearchResult::Idle);
        Self {
            subject: subject.to_string(),
            client,
            analysis,
            search,
            search_seq: Mutex::new(0),
        }
    }

    fn search_seq(&self) -> MutexGuard<'_, u64> {
        self.search_seq
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn analysis(&self) -> AnalysisResult {
        self.analysis.borrow().clone()
    }

    pub fn search(&self) -> SearchResult {
        self.search.borrow().clone()
    }

    pub fn subscribe_analysis(&self) -> watch::Receiver<AnalysisResult> {
        self.analysis.subscribe()
    }

    pub fn subscribe_search(&self) -> watch::Receiver<SearchResult> {
        self.search.subscribe()
    }

    /// Request the analysis for `version` of the profile.
    ///
    /// An incomplete profile is rejected before anything is dispatched.
    /// Remote failures come back as `Ok(AnalysisResult::Failed { .. })`. The
    /// returned value is the coordinator's state once this request settles;
    /// if a newer version took over meanwhile, that newer state is returned.
    pub async fn request_analysis(
        &self,
        profile: &UserProfile,
        version: ProfileVersion,
    ) -> Result<AnalysisResult> {
        profile.ensure_complete()?;

        let mut dispatch = Dispatch::Issue;
        self.analysis.send_if_modified(|state| {
            dispatch = match &*state {
                s if s.version().is_some_and(|current| version < current) => Dispatch::Stale,
                AnalysisResult::Loading { version: v } if *v == version => Dispatch::Join,
                AnalysisResult::Ready { version: v, .. } if *v == version => Dispatch::Cached,
                _ => Dispatch::Issue,
            };
            if matches!(dispatch, Dispatch::Issue) {
                *state = AnalysisResult::Loading { version };
                true
            } else {
                false
            }
        });

        match dispatch {
            Dispatch::Stale => {
                logging::log_analysis(
                    Some(&self.subject),
                    &format!("Ignoring request for superseded profile {}", version),
                );
                Ok(self.analysis())
            }
            Dispatch::Cached => Ok(self.analysis()),
            Dispatch::Join => {
                logging::log_analysis(
                    Some(&self.subject),
                    &format!("Joining in-flight analysis for {}", version),
                );
                Ok(self.settled(version).await)
            }
            Dispatch::Issue => {
                logging::log_analysis(
                    Some(&self.subject),
                    &format!("Dispatching analysis for {} via {}", version, self.client.advisor_name()),
                );
                let mut in_flight = InFlight {
                    state: &self.analysis,
                    subject: &self.subject,
                    version,
                    settled: false,
                };
                let outcome = self.client.analyze(profile).await;
                self.apply_analysis(version, outcome);
                in_flight.settled = true;
                Ok(self.analysis())
            }
        }
    }

    /// Wait until `version` is no longer loading.
    async fn settled(&self, version: ProfileVersion) -> AnalysisResult {
        let mut rx = self.analysis.subscribe();
        let waited = rx
            .wait_for(|state| !matches!(state, AnalysisResult::Loading { version: v } if *v == version))
            .await
            .map(|state| state.clone());
        match waited {
            Ok(state) => state,
            Err(_) => self.analysis(),
        }
    }

    fn apply_analysis(&self, version: ProfileVersion, outcome: Result<Vec<CareerPath>>) {
        let summary = match &outcome {
            Ok(paths) => format!("{} career paths", paths.len()),
            Err(e) => e.to_string(),
        };

        let applied = self.analysis.send_if_modified(|state| {
            let waiting = matches!(&*state, AnalysisResult::Loading { version: v } if *v == version);
            if !waiting {
                return false;
            }
            *state = match outcome {
                Ok(paths) => AnalysisResult::Ready { version, paths },
                Err(e) => AnalysisResult::Failed {
                    version,
                    error: e.kind(),
                    message: e.to_string(),
                },
            };
            true
        });

        if applied {
            logging::log_analysis(
                Some(&self.subject),
                &format!("Analysis for {} settled: {}", version, summary),
            );
        } else {
            logging::log_analysis(
                Some(&self.subject),
                &format!("Discarded stale response for {} ({})", version, summary),
            );
        }
    }

    /// Run a career search. Every call is independent; the newest one wins.
    ///
    /// Empty queries and incomplete profiles are rejected before dispatch.
    pub async fn request_search(
        &self,
        profile: &UserProfile,
        version: ProfileVersion,
        query: &str,
    ) -> Result<SearchResult> {
        profile.ensure_complete()?;
        let query = normalize_query(query)?.to_string();

        let seq = {
            let mut latest = self.search_seq();
            *latest += 1;
            self.search.send_replace(SearchResult::Loading {
                query: query.clone(),
            });
            *latest
        };
        logging::log_search(
            Some(&self.subject),
            &format!("Searching \"{}\" with profile {}", query, version),
        );

        let outcome = self.client.search(profile, &query).await;

        let latest = self.search_seq();
        if *latest != seq {
            logging::log_search(
                Some(&self.subject),
                &format!("Dropped superseded search \"{}\"", query),
            );
            drop(latest);
            return Ok(self.search());
        }

        let next = match outcome {
            Ok(paths) => {
                logging::log_search(
                    Some(&self.subject),
                    &format!("Search \"{}\" returned {} career paths", query, paths.len()),
                );
                SearchResult::Ready { query, paths }
            }
            Err(e) => {
                logging::log_error(Some(&self.subject), &format!("Search \"{}\" failed: {}", query, e));
                SearchResult::Failed {
                    query,
                    error: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        self.search.send_replace(next.clone());
        Ok(next)
    }

    /// Forget both results; anything still in flight will be discarded.
    pub fn reset(&self) {
        let mut latest = self.search_seq();
        *latest += 1;
        self.search.send_replace(SearchResult::Idle);
        drop(latest);
        self.analysis.send_replace(AnalysisResult::Idle);
    }
}
