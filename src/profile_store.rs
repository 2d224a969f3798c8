//! Profile store
//!
//! Owns the canonical profile for one subject plus the draft being edited.
//! The stored profile only changes through `replace`, which persists first and
//! touches memory only once storage has acknowledged the write.
//!
//! Versions are persisted with the profile, so numbering continues across
//! sessions instead of restarting at v1.

use crate::db::ProfileStorage;
use crate::error::Result;
use crate::logging;
use crate::models::{ProfileField, ProfileVersion, UserProfile};
use std::sync::Arc;

pub struct ProfileStore {
    subject: String,
    storage: Arc<dyn ProfileStorage>,
    current: Option<UserProfile>,
    /// Version of `current`; `None` while no profile exists
    current_version: Option<ProfileVersion>,
    last_issued: u64,
    draft: UserProfile,
}

impl ProfileStore {
    /// Load the subject's stored profile. Unreadable or unparsable records are
    /// treated as absent so the engine always starts.
    pub fn load(subject: &str, storage: Arc<dyn ProfileStorage>) -> Self {
        let current = match storage.load_profile(subject) {
            Ok(Some(raw)) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(profile) => {
                    logging::log_profile(Some(subject), "Loaded stored profile");
                    Some(profile)
                }
                Err(e) => {
                    logging::log_error(
                        Some(subject),
                        &format!("Stored profile is corrupt, starting empty: {}", e),
                    );
                    None
                }
            },
            Ok(None) => {
                logging::log_profile(Some(subject), "No stored profile");
                None
            }
            Err(e) => {
                logging::log_error(
                    Some(subject),
                    &format!("Could not read stored profile, starting empty: {}", e),
                );
                None
            }
        };

        let last_issued = match storage.profile_version(subject) {
            Ok(version) => version,
            Err(e) => {
                logging::log_error(
                    Some(subject),
                    &format!("Could not read stored profile version: {}", e),
                );
                0
            }
        };

        let mut store = Self {
            subject: subject.to_string(),
            storage,
            draft: current.clone().unwrap_or_default(),
            current: None,
            current_version: None,
            last_issued,
        };
        if let Some(profile) = current {
            // Records saved without a version get the first one
            let version = if last_issued > 0 {
                ProfileVersion::new(last_issued)
            } else {
                store.last_issued = 1;
                ProfileVersion::new(1)
            };
            store.current = Some(profile);
            store.current_version = Some(version);
        }
        store
    }

    pub fn get(&self) -> Option<&UserProfile> {
        self.current.as_ref()
    }

    pub fn has_profile(&self) -> bool {
        self.current.is_some()
    }

    pub fn version(&self) -> Option<ProfileVersion> {
        self.current_version
    }

    /// Persist `profile` as the subject's profile and mint a new version.
    ///
    /// Does not check completeness. On a storage failure nothing changes in
    /// memory and no version is consumed.
    pub fn replace(&mut self, profile: UserProfile) -> Result<ProfileVersion> {
        let payload = serde_json::to_string(&profile)?;
        let next = self.last_issued + 1;
        if let Err(e) = self.storage.save_profile(&self.subject, &payload, next) {
            logging::log_error(Some(&self.subject), &format!("Profile save failed: {}", e));
            return Err(e);
        }

        self.last_issued = next;
        let version = ProfileVersion::new(next);
        self.draft = profile.clone();
        self.current = Some(profile);
        self.current_version = Some(version);
        logging::log_profile(Some(&self.subject), &format!("Saved profile {}", version));
        Ok(version)
    }

    // ============ Draft editing ============

    pub fn draft(&self) -> &UserProfile {
        &self.draft
    }

    pub fn edit(&mut self, field: ProfileField, value: impl Into<String>) {
        self.draft.set_field(field, value);
    }

    pub fn set_picture(&mut self, mime: &str, bytes: &[u8]) -> Result<()> {
        self.draft.set_picture(mime, bytes)
    }

    pub fn clear_picture(&mut self) {
        self.draft.dp = None;
    }

    /// Throw away unsaved edits.
    pub fn discard_draft(&mut self) {
        self.draft = self.current.clone().unwrap_or_default();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FlakyStorage;
    use super::*;
    use crate::db::{InMemoryStorage, SqliteStorage};
    use crate::error::EngineError;
    use crate::models::fixtures::ava;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_absent_on_first_run() {
        let store = ProfileStore::load("ava", Arc::new(InMemoryStorage::new()));
        assert!(store.get().is_none());
        assert!(store.version().is_none());
        assert_eq!(store.draft(), &UserProfile::default());
    }

    #[test]
    fn test_versions_strictly_increase() {
        let mut store = ProfileStore::load("ava", Arc::new(InMemoryStorage::new()));
        let mut previous = None;
        for i in 0..5 {
            let mut profile = ava();
            profile.skills = format!("skill-{}", i);
            let version = store.replace(profile).unwrap();
            if let Some(prev) = previous {
                assert!(version > prev);
            }
            previous = Some(version);
        }
        assert_eq!(store.version(), previous);
    }

    #[test]
    fn test_replace_persists_whole_profile() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = ProfileStore::load("ava", storage.clone());

        let mut first = ava();
        first.dp = Some("data:image/png;base64,AA==".to_string());
        store.replace(first).unwrap();
        store.replace(ava()).unwrap();

        let reloaded = ProfileStore::load("ava", storage);
        assert_eq!(reloaded.get(), Some(&ava()));
        assert!(reloaded.get().unwrap().dp.is_none());
    }

    #[test]
    fn test_corrupt_record_is_absent() {
        let storage = InMemoryStorage::new().with_profile("ava", "{not json");
        let store = ProfileStore::load("ava", Arc::new(storage));
        assert!(store.get().is_none());
        assert!(!store.has_profile());
    }

    #[test]
    fn test_unreadable_storage_is_absent() {
        let storage = FlakyStorage::default();
        storage.fail_reads.store(true, Ordering::SeqCst);
        let store = ProfileStore::load("ava", Arc::new(storage));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_loaded_profile_gets_a_version() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .save_profile("ava", &serde_json::to_string(&ava()).unwrap(), 0)
            .unwrap();
        let mut store = ProfileStore::load("ava", Arc::new(storage));
        let loaded = store.version().unwrap();
        assert_eq!(loaded.get(), 1);
        assert_eq!(store.draft(), &ava());

        let next = store.replace(ava()).unwrap();
        assert!(next > loaded);
    }

    #[test]
    fn test_versions_keep_increasing_across_sessions() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let mut first = ProfileStore::load("ava", storage.clone());
        first.replace(ava()).unwrap();
        let last = first.replace(ava()).unwrap();
        drop(first);

        let mut second = ProfileStore::load("ava", storage.clone());
        assert_eq!(second.version(), Some(last));
        let next = second.replace(ava()).unwrap();
        assert!(next > last);

        let third = ProfileStore::load("ava", storage);
        assert_eq!(third.version(), Some(next));
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let storage = Arc::new(FlakyStorage::default());
        let mut store = ProfileStore::load("ava", storage.clone());
        let v1 = store.replace(ava()).unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        let mut changed = ava();
        changed.name = "Someone Else".to_string();
        let err = store.replace(changed).unwrap_err();

        assert!(matches!(err, EngineError::Storage(_)));
        assert_eq!(store.get(), Some(&ava()));
        assert_eq!(store.version(), Some(v1));

        storage.fail_writes.store(false, Ordering::SeqCst);
        let v2 = store.replace(ava()).unwrap();
        assert!(v2 > v1);
    }

    #[test]
    fn test_draft_edits_do_not_touch_stored_profile() {
        let mut store = ProfileStore::load("ava", Arc::new(InMemoryStorage::new()));
        store.edit(ProfileField::Name, "Ava");
        store.edit(ProfileField::Skills, "Rust");
        store.set_picture("image/jpeg", &[0xFF, 0xD8]).unwrap();

        assert_eq!(store.draft().name, "Ava");
        assert!(store.draft().dp.is_some());
        assert!(store.get().is_none());

        store.discard_draft();
        assert_eq!(store.draft(), &UserProfile::default());
    }
}
