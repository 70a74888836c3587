//! File-backed, git-audited profile storage.
//!
//! ## Storage layout
//!
//! ```text
//! profiles/
//!   <patient_id>/
//!     .git/
//!     .gitignore
//!     records/
//!       <record_id>.yaml    # one file per version
//! ```
//!
//! Each save is one commit in the patient's repository. Lineages are rebuilt from the record
//! files on every read; a file that cannot be read or parsed is skipped with a warning so one
//! damaged version does not hide the rest of a patient's history.

use crate::config::CoreConfig;
use crate::constants::{DEFAULT_GITIGNORE, RECORDS_DIR_NAME, YAML_EXTENSION};
use crate::error::{IntakeError, IntakeResult};
use crate::record::ProfileRecord;
use crate::store::{self, ProfileStore, SaveMode};
use crate::versioned_files::{CommitAction, FileToWrite, IntakeCommitMessage, VersionedFileService};
use async_trait::async_trait;
use chrono::Utc;
use intake_types::{PatientId, TermId};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct FileProfileStore {
    cfg: Arc<CoreConfig>,
    // Serialises check-then-write so two saves cannot both pass the staleness check.
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            write_lock: Mutex::new(()),
        }
    }

    fn patient_dir(&self, patient: &PatientId) -> PathBuf {
        self.cfg.profiles_dir().join(patient.as_str())
    }

    async fn load(&self, patient: &PatientId) -> IntakeResult<Vec<ProfileRecord>> {
        let dir = self.patient_dir(patient);
        tokio::task::spawn_blocking(move || load_records(&dir, Unreadable::Skip)).await?
    }

    /// Commit messages of a patient's repository, newest first.
    pub async fn audit_log(&self, patient: &PatientId) -> IntakeResult<Vec<String>> {
        let dir = self.patient_dir(patient);
        tokio::task::spawn_blocking(move || {
            if !dir.join(".git").exists() {
                return Ok(Vec::new());
            }
            VersionedFileService::open(&dir)?.commit_messages()
        })
        .await?
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn fetch(
        &self,
        patient: &PatientId,
        term: &TermId,
    ) -> IntakeResult<Option<ProfileRecord>> {
        let lineage = lineage_of(self.load(patient).await?, term);
        Ok(store::live_of(&lineage).cloned())
    }

    async fn fetch_latest_prior_any(
        &self,
        patient: &PatientId,
    ) -> IntakeResult<Option<ProfileRecord>> {
        let all = self.load(patient).await?;
        Ok(store::latest_across_terms(&all).cloned())
    }

    async fn save(&self, record: ProfileRecord, mode: SaveMode) -> IntakeResult<ProfileRecord> {
        let _guard = self.write_lock.lock().await;
        let dir = self.patient_dir(&record.patient_id);
        let cfg = self.cfg.clone();
        let saved =
            tokio::task::spawn_blocking(move || save_record(&cfg, &dir, record, mode)).await??;
        tracing::info!(
            term = %saved.term_id,
            version = ?saved.version,
            action = mode.as_str(),
            "committed profile record"
        );
        Ok(saved)
    }

    async fn history(
        &self,
        patient: &PatientId,
        term: &TermId,
    ) -> IntakeResult<Vec<ProfileRecord>> {
        let mut lineage = lineage_of(self.load(patient).await?, term);
        lineage.sort_by_key(|r| r.version.unwrap_or(0));
        Ok(lineage)
    }
}

fn lineage_of(records: Vec<ProfileRecord>, term: &TermId) -> Vec<ProfileRecord> {
    records
        .into_iter()
        .filter(|r| &r.term_id == term)
        .collect()
}

fn record_path(id: impl std::fmt::Display) -> PathBuf {
    Path::new(RECORDS_DIR_NAME).join(format!("{id}.{YAML_EXTENSION}"))
}

/// What to do with a record file that cannot be read.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Unreadable {
    /// Log and carry on; reads show whatever is intact.
    Skip,
    /// Fail; a save must see the whole lineage.
    Fail,
}

/// Read every record file of a patient. A missing folder is an empty history.
fn load_records(patient_dir: &Path, unreadable: Unreadable) -> IntakeResult<Vec<ProfileRecord>> {
    let records_dir = patient_dir.join(RECORDS_DIR_NAME);
    let entries = match fs::read_dir(&records_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IntakeError::FileRead(e)),
    };

    let mut records = Vec::new();
    for entry in entries {
        let path = entry.map_err(IntakeError::FileRead)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(YAML_EXTENSION) {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(IntakeError::FileRead)
            .and_then(|text| {
                serde_yaml::from_str::<ProfileRecord>(&text)
                    .map_err(IntakeError::YamlDeserialization)
            });
        match parsed {
            Ok(record) => records.push(record),
            Err(err) if unreadable == Unreadable::Fail => {
                tracing::error!(path = %path.display(), error = %err, "refusing to save over an unreadable profile record");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable profile record");
            }
        }
    }
    Ok(records)
}

fn save_record(
    cfg: &CoreConfig,
    patient_dir: &Path,
    mut record: ProfileRecord,
    mode: SaveMode,
) -> IntakeResult<ProfileRecord> {
    let all = load_records(patient_dir, Unreadable::Fail)?;
    let lineage = lineage_of(all, &record.term_id);
    let id = store::check_save(&lineage, &record, mode)?;

    record.saved_at = Some(Utc::now());
    let yaml = serde_yaml::to_string(&record).map_err(IntakeError::YamlSerialization)?;
    let relative = record_path(id);

    let summary = match mode {
        SaveMode::Create => "Profile created",
        SaveMode::Update => "Profile updated",
        SaveMode::CreateVersion => "Profile version created",
    };
    let mut msg = IntakeCommitMessage::new(CommitAction::from(mode), summary, cfg.clinic().as_str())?
        .with_trailer("Term", record.term_id.as_str())?
        .with_trailer("Version", record.version.unwrap_or(1).to_string())?;
    if let Some(previous) = record.previous_version_id {
        msg = msg.with_trailer("Previous-Version", previous.to_string())?;
    }

    let author = cfg.commit_author();
    if patient_dir.join(".git").exists() {
        let old_content = match mode {
            SaveMode::Update => fs::read_to_string(patient_dir.join(&relative)).ok(),
            SaveMode::Create | SaveMode::CreateVersion => None,
        };
        VersionedFileService::write_and_commit_files(
            patient_dir,
            author,
            &msg,
            &[FileToWrite {
                relative_path: &relative,
                content: &yaml,
                old_content: old_content.as_deref(),
            }],
        )?;
    } else {
        VersionedFileService::init_and_commit(
            patient_dir,
            author,
            &msg,
            &[
                FileToWrite {
                    relative_path: Path::new(".gitignore"),
                    content: DEFAULT_GITIGNORE,
                    old_content: None,
                },
                FileToWrite {
                    relative_path: &relative,
                    content: &yaml,
                    old_content: None,
                },
            ],
        )?;
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitAuthor;
    use intake_types::{EmailAddress, NonEmptyText, RecordId, UserCategory};
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> FileProfileStore {
        let cfg = CoreConfig::new(
            temp.path().join("data"),
            temp.path().join("config"),
            "Main Campus Clinic",
            CommitAuthor {
                name: NonEmptyText::new("Intake Desk").unwrap(),
                email: EmailAddress::parse("intake@clinic.example.edu").unwrap(),
            },
        )
        .unwrap();
        FileProfileStore::new(Arc::new(cfg))
    }

    fn patient() -> PatientId {
        PatientId::parse("2020-0099").unwrap()
    }

    fn term() -> TermId {
        TermId::new("2024-2025 1st Semester").unwrap()
    }

    fn record(version: u32, previous: Option<RecordId>) -> ProfileRecord {
        let mut record = ProfileRecord::blank(patient(), term());
        record.id = Some(RecordId::new());
        record.version = Some(version);
        record.previous_version_id = previous;
        record.fields.first_name = "Lea".into();
        record
            .fields
            .extra
            .insert("blood_type".into(), serde_json::json!("AB+"));
        record
    }

    #[tokio::test]
    async fn saves_round_trip_through_yaml_and_git() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let v1 = store.save(record(1, None), SaveMode::Create).await.unwrap();
        let v2 = store
            .save(record(2, v1.id), SaveMode::CreateVersion)
            .await
            .unwrap();

        let live = store.fetch(&patient(), &term()).await.unwrap().unwrap();
        assert_eq!(live.id, v2.id);
        assert_eq!(live.fields.text("blood_type"), Some("AB+"));

        let history = store.history(&patient(), &term()).await.unwrap();
        assert_eq!(history.len(), 2);
        crate::versioning::verify_lineage(&history).unwrap();

        let log = store.audit_log(&patient()).await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].starts_with("profile:version: Profile version created"));
        assert!(log[0].contains("Clinic: Main Campus Clinic"));
        assert!(log[0].contains(&format!("Previous-Version: {}", v1.id.unwrap())));
        assert!(log[1].starts_with("profile:create: Profile created"));
        assert!(!log[0].contains("Lea"));
    }

    #[tokio::test]
    async fn stale_writes_conflict_and_leave_no_commit() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let v1 = store.save(record(1, None), SaveMode::Create).await.unwrap();
        store
            .save(record(2, v1.id), SaveMode::CreateVersion)
            .await
            .unwrap();

        let err = store.save(v1, SaveMode::Update).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.audit_log(&patient()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let v1 = store.save(record(1, None), SaveMode::Create).await.unwrap();

        let junk = store
            .patient_dir(&patient())
            .join(RECORDS_DIR_NAME)
            .join("broken.yaml");
        fs::write(junk, "id: [not a record").unwrap();

        let live = store.fetch(&patient(), &term()).await.unwrap();
        assert_eq!(live.and_then(|r| r.id), v1.id);
    }

    #[tokio::test]
    async fn retired_category_keeps_the_lineage_visible() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let mut first = record(1, None);
        first.fields.user_category = Some(UserCategory::College);
        let v1 = store.save(first, SaveMode::Create).await.unwrap();

        let path = store
            .patient_dir(&patient())
            .join(record_path(v1.id.unwrap()));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("user_category: College"));
        fs::write(&path, text.replace("user_category: College", "user_category: Alumni")).unwrap();

        let live = store.fetch(&patient(), &term()).await.unwrap().unwrap();
        assert_eq!(live.id, v1.id);
        assert_eq!(live.fields.user_category, None);

        let err = store.save(record(1, None), SaveMode::Create).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn saving_next_to_an_unreadable_file_fails() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let v1 = store.save(record(1, None), SaveMode::Create).await.unwrap();

        let path = store
            .patient_dir(&patient())
            .join(record_path(v1.id.unwrap()));
        fs::write(&path, "id: [not a record").unwrap();
        assert!(store.fetch(&patient(), &term()).await.unwrap().is_none());

        let err = store.save(record(1, None), SaveMode::Create).await.unwrap_err();
        assert!(matches!(err, IntakeError::YamlDeserialization(_)));
        assert_eq!(store.audit_log(&patient()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_patient_has_no_records() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.fetch(&patient(), &term()).await.unwrap().is_none());
        assert!(store
            .fetch_latest_prior_any(&patient())
            .await
            .unwrap()
            .is_none());
        assert!(store.audit_log(&patient()).await.unwrap().is_empty());
    }
}
