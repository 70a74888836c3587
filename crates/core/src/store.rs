//! Collaborator interfaces and their in-memory implementations.
//!
//! The engine never talks to storage directly. Profiles, category configuration and the
//! signed-in user are reached through the async traits below; [`crate::repositories`] has
//! the file-backed implementations and this module has in-memory ones for tests and embedding.

use crate::error::{IntakeError, IntakeResult};
use crate::policy::CategoryConfig;
use crate::record::ProfileRecord;
use crate::versioning::next_version;
use async_trait::async_trait;
use chrono::Utc;
use intake_types::{PatientId, RecordId, TermId, UserCategory};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// How a record is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// First record of a (patient, term) lineage.
    Create,
    /// Overwrite the live record.
    Update,
    /// Append a new version pointing back at the live record.
    CreateVersion,
}

impl SaveMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::CreateVersion => "version",
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The live record of the (patient, term) lineage.
    async fn fetch(&self, patient: &PatientId, term: &TermId)
        -> IntakeResult<Option<ProfileRecord>>;

    /// The most recently saved live record of any term.
    async fn fetch_latest_prior_any(&self, patient: &PatientId)
        -> IntakeResult<Option<ProfileRecord>>;

    /// Persist `record`; rejects stale writes with [`IntakeError::Conflict`].
    async fn save(&self, record: ProfileRecord, mode: SaveMode) -> IntakeResult<ProfileRecord>;

    /// Every version of the (patient, term) lineage, oldest first.
    async fn history(&self, patient: &PatientId, term: &TermId)
        -> IntakeResult<Vec<ProfileRecord>>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn category_config(&self, category: UserCategory)
        -> IntakeResult<Option<CategoryConfig>>;

    /// The term new intakes are filed under.
    async fn active_term(&self) -> IntakeResult<Option<TermId>>;
}

/// The signed-in user, used to seed a first-ever draft.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserIdentity {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub email: String,
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn current_user(&self) -> IntakeResult<UserIdentity>;
}

/// Reject a write that would lose an update, fork from a stale version, or break the
/// version chain.
///
/// `lineage` is the stored lineage of the record's (patient, term), in any order.
pub(crate) fn check_save(
    lineage: &[ProfileRecord],
    record: &ProfileRecord,
    mode: SaveMode,
) -> IntakeResult<RecordId> {
    let id = record
        .id
        .ok_or_else(|| IntakeError::InvalidInput("record to save has no id".into()))?;
    let live = live_of(lineage);
    let live_id = live.and_then(|r| r.id);
    let conflict = |expected: Option<RecordId>| IntakeError::Conflict {
        term: record.term_id.clone(),
        expected,
        found: live_id,
    };

    match mode {
        SaveMode::Create => {
            if live_id.is_some() {
                return Err(conflict(None));
            }
            if record.version != Some(1) || record.previous_version_id.is_some() {
                return Err(IntakeError::BrokenLineage(format!(
                    "new lineage must start at version 1 without a back-reference, got record {id} at version {:?}",
                    record.version
                )));
            }
        }
        SaveMode::Update => {
            if !lineage.iter().any(|r| r.id == Some(id)) {
                return Err(IntakeError::RecordNotFound(id));
            }
            if live_id != Some(id) {
                return Err(conflict(Some(id)));
            }
            if let Some(live) = live {
                if record.version != live.version
                    || record.previous_version_id != live.previous_version_id
                {
                    return Err(IntakeError::BrokenLineage(format!(
                        "update of record {id} may not change its version or back-reference"
                    )));
                }
            }
        }
        SaveMode::CreateVersion => {
            if record.previous_version_id.is_none() || record.previous_version_id != live_id {
                return Err(conflict(record.previous_version_id));
            }
            let expected = next_version(live.and_then(|r| r.version).unwrap_or(1))?;
            if record.version != Some(expected) {
                return Err(IntakeError::BrokenLineage(format!(
                    "record {id} is version {:?}, expected {expected}",
                    record.version
                )));
            }
        }
    }
    Ok(id)
}

/// Highest version of a lineage.
pub(crate) fn live_of(lineage: &[ProfileRecord]) -> Option<&ProfileRecord> {
    lineage.iter().max_by_key(|r| r.version.unwrap_or(0))
}

/// Most recently saved live record across all of a patient's lineages.
pub(crate) fn latest_across_terms(records: &[ProfileRecord]) -> Option<&ProfileRecord> {
    let mut by_term: BTreeMap<&TermId, Vec<&ProfileRecord>> = BTreeMap::new();
    for record in records {
        by_term.entry(&record.term_id).or_default().push(record);
    }
    by_term
        .into_values()
        .filter_map(|lineage| lineage.into_iter().max_by_key(|r| r.version.unwrap_or(0)))
        .max_by_key(|r| r.saved_at)
}

/// Profile store backed by a map; lineages live only as long as the store.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    records: RwLock<HashMap<PatientId, Vec<ProfileRecord>>>,
    unavailable: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`IntakeError::StoreUnavailable`], or recover.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> IntakeResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IntakeError::StoreUnavailable(
                "in-memory profile store is offline".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch(
        &self,
        patient: &PatientId,
        term: &TermId,
    ) -> IntakeResult<Option<ProfileRecord>> {
        self.ensure_available()?;
        let records = self.records.read().await;
        let lineage: Vec<ProfileRecord> = records
            .get(patient)
            .into_iter()
            .flatten()
            .filter(|r| &r.term_id == term)
            .cloned()
            .collect();
        Ok(live_of(&lineage).cloned())
    }

    async fn fetch_latest_prior_any(
        &self,
        patient: &PatientId,
    ) -> IntakeResult<Option<ProfileRecord>> {
        self.ensure_available()?;
        let records = self.records.read().await;
        Ok(records
            .get(patient)
            .and_then(|all| latest_across_terms(all))
            .cloned())
    }

    async fn save(&self, mut record: ProfileRecord, mode: SaveMode) -> IntakeResult<ProfileRecord> {
        self.ensure_available()?;
        let mut records = self.records.write().await;
        let all = records.entry(record.patient_id.clone()).or_default();
        let lineage: Vec<ProfileRecord> = all
            .iter()
            .filter(|r| r.term_id == record.term_id)
            .cloned()
            .collect();
        let id = check_save(&lineage, &record, mode)?;

        record.saved_at = Some(Utc::now());
        match mode {
            SaveMode::Update => {
                if let Some(slot) = all.iter_mut().find(|r| r.id == Some(id)) {
                    *slot = record.clone();
                }
            }
            SaveMode::Create | SaveMode::CreateVersion => all.push(record.clone()),
        }
        Ok(record)
    }

    async fn history(
        &self,
        patient: &PatientId,
        term: &TermId,
    ) -> IntakeResult<Vec<ProfileRecord>> {
        self.ensure_available()?;
        let records = self.records.read().await;
        let mut lineage: Vec<ProfileRecord> = records
            .get(patient)
            .into_iter()
            .flatten()
            .filter(|r| &r.term_id == term)
            .cloned()
            .collect();
        lineage.sort_by_key(|r| r.version.unwrap_or(0));
        Ok(lineage)
    }
}

/// Config store holding category configurations in memory.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    configs: HashMap<UserCategory, CategoryConfig>,
    active_term: Option<TermId>,
    unavailable: AtomicBool,
}

impl InMemoryConfigStore {
    pub fn new(active_term: Option<TermId>) -> Self {
        Self {
            active_term,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, category: UserCategory, config: CategoryConfig) -> Self {
        self.configs.insert(category, config);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> IntakeResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IntakeError::StoreUnavailable(
                "in-memory config store is offline".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn category_config(
        &self,
        category: UserCategory,
    ) -> IntakeResult<Option<CategoryConfig>> {
        self.ensure_available()?;
        Ok(self.configs.get(&category).cloned())
    }

    async fn active_term(&self) -> IntakeResult<Option<TermId>> {
        self.ensure_available()?;
        Ok(self.active_term.clone())
    }
}

/// Identity source returning a fixed user.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity(pub UserIdentity);

#[async_trait]
impl IdentitySource for StaticIdentity {
    async fn current_user(&self) -> IntakeResult<UserIdentity> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> PatientId {
        PatientId::parse("2019-0042").unwrap()
    }

    fn term(label: &str) -> TermId {
        TermId::new(label).unwrap()
    }

    fn new_record(term_label: &str, version: u32, previous: Option<RecordId>) -> ProfileRecord {
        let mut record = ProfileRecord::blank(patient(), term(term_label));
        record.id = Some(RecordId::new());
        record.version = Some(version);
        record.previous_version_id = previous;
        record
    }

    #[tokio::test]
    async fn create_then_fetch_live_record() {
        let store = InMemoryProfileStore::new();
        let first = store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap();
        assert!(first.saved_at.is_some());

        let fetched = store.fetch(&patient(), &term("2024 1st")).await.unwrap();
        assert_eq!(fetched.and_then(|r| r.id), first.id);
        assert!(store
            .fetch(&patient(), &term("2024 2nd"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn second_create_for_a_term_conflicts() {
        let store = InMemoryProfileStore::new();
        store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap();
        let err = store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn stale_fork_and_stale_update_conflict() {
        let store = InMemoryProfileStore::new();
        let v1 = store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap();
        let v2 = store
            .save(new_record("2024 1st", 2, v1.id), SaveMode::CreateVersion)
            .await
            .unwrap();

        let err = store
            .save(new_record("2024 1st", 2, v1.id), SaveMode::CreateVersion)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let err = store.save(v1.clone(), SaveMode::Update).await.unwrap_err();
        assert!(err.is_conflict());

        let mut edited = v2.clone();
        edited.fields.address = "Updated".into();
        store.save(edited, SaveMode::Update).await.unwrap();

        let history = store.history(&patient(), &term("2024 1st")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].fields.address, "Updated");
        crate::versioning::verify_lineage(&history).unwrap();
    }

    #[tokio::test]
    async fn saves_that_break_the_version_chain_are_rejected() {
        let store = InMemoryProfileStore::new();
        let err = store
            .save(new_record("2024 1st", 2, None), SaveMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::BrokenLineage(_)));

        let v1 = store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap();

        let err = store
            .save(new_record("2024 1st", 7, v1.id), SaveMode::CreateVersion)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::BrokenLineage(_)));

        let mut renumbered = v1.clone();
        renumbered.version = Some(5);
        let err = store.save(renumbered, SaveMode::Update).await.unwrap_err();
        assert!(matches!(err, IntakeError::BrokenLineage(_)));

        let mut repointed = v1.clone();
        repointed.previous_version_id = Some(RecordId::new());
        let err = store.save(repointed, SaveMode::Update).await.unwrap_err();
        assert!(matches!(err, IntakeError::BrokenLineage(_)));

        let history = store.history(&patient(), &term("2024 1st")).await.unwrap();
        assert_eq!(history.len(), 1);
        crate::versioning::verify_lineage(&history).unwrap();
    }

    #[tokio::test]
    async fn updating_an_unknown_record_is_not_found() {
        let store = InMemoryProfileStore::new();
        let err = store
            .save(new_record("2024 1st", 1, None), SaveMode::Update)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn latest_prior_spans_terms() {
        let store = InMemoryProfileStore::new();
        store
            .save(new_record("2023 2nd", 1, None), SaveMode::Create)
            .await
            .unwrap();
        let newest = store
            .save(new_record("2024 1st", 1, None), SaveMode::Create)
            .await
            .unwrap();

        let prior = store.fetch_latest_prior_any(&patient()).await.unwrap();
        assert_eq!(prior.map(|r| r.term_id), Some(newest.term_id));
    }

    #[tokio::test]
    async fn offline_stores_report_unavailable() {
        let store = InMemoryProfileStore::new();
        store.set_unavailable(true);
        let err = store.fetch(&patient(), &term("2024 1st")).await.unwrap_err();
        assert!(matches!(err, IntakeError::StoreUnavailable(_)));

        let config = InMemoryConfigStore::new(Some(term("2024 1st")));
        assert_eq!(config.active_term().await.unwrap(), Some(term("2024 1st")));
        config.set_unavailable(true);
        assert!(config.category_config(UserCategory::College).await.is_err());
    }
}
