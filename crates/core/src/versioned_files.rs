//! Git-versioned files for profile storage.
//!
//! Every patient folder is its own git repository (`git2`/libgit2). Each save writes the
//! record files and commits them together; if any step fails, files are restored and new
//! directories removed so the working tree never holds an uncommitted save.
//!
//! ## Commit messages
//!
//! Messages are structured and predictable:
//!
//! ```text
//! profile:<action>: <summary>
//!
//! Clinic: <clinic>
//! <Key>: <Value>      (sorted)
//! ```
//!
//! Commit messages are labels, not content: no patient identifiers or clinical text.
//!
//! ## Branch policy
//!
//! Every repository commits on `refs/heads/main`.

use crate::config::CommitAuthor;
use crate::error::{IntakeError, IntakeResult};
use crate::store::SaveMode;
use intake_types::NonEmptyText;
use std::fmt;
use std::path::{Component, Path, PathBuf};

const MAIN_REF: &str = "refs/heads/main";
const COMMIT_DOMAIN: &str = "profile";
const CLINIC_TRAILER: &str = "Clinic";

/// What a commit did to the profile lineage.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum CommitAction {
    Create,
    Update,
    Version,
}

impl CommitAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Version => "version",
        }
    }
}

impl From<SaveMode> for CommitAction {
    fn from(mode: SaveMode) -> Self {
        match mode {
            SaveMode::Create => Self::Create,
            SaveMode::Update => Self::Update,
            SaveMode::CreateVersion => Self::Version,
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `Key: Value` trailer line.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct CommitTrailer {
    key: String,
    value: String,
}

impl CommitTrailer {
    /// # Errors
    ///
    /// `InvalidInput` if either part is empty or multi-line, or the key contains ':'.
    pub(crate) fn new(key: impl Into<String>, value: impl Into<String>) -> IntakeResult<Self> {
        let key = key.into().trim().to_string();
        let value = value.into().trim().to_string();

        if key.is_empty()
            || key.contains(['\n', '\r', ':'])
            || value.is_empty()
            || value.contains(['\n', '\r'])
        {
            return Err(IntakeError::InvalidInput(
                "commit trailer key/value must be non-empty and single-line (key cannot contain ':')"
                    .into(),
            ));
        }

        Ok(Self { key, value })
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> &str {
        &self.value
    }
}

/// A structured commit message for a profile save.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct IntakeCommitMessage {
    action: CommitAction,
    summary: NonEmptyText,
    clinic: NonEmptyText,
    trailers: Vec<CommitTrailer>,
}

impl IntakeCommitMessage {
    /// # Errors
    ///
    /// `InvalidInput` for an empty or multi-line summary; `InvalidClinic` for an empty or
    /// multi-line clinic.
    pub(crate) fn new(
        action: CommitAction,
        summary: impl AsRef<str>,
        clinic: impl AsRef<str>,
    ) -> IntakeResult<Self> {
        let summary = NonEmptyText::single_line(summary.as_ref()).map_err(|_| {
            IntakeError::InvalidInput("commit summary must be non-empty and single-line".into())
        })?;
        let clinic =
            NonEmptyText::single_line(clinic.as_ref()).map_err(|_| IntakeError::InvalidClinic)?;

        Ok(Self {
            action,
            summary,
            clinic,
            trailers: Vec::new(),
        })
    }

    /// Add a trailer. `Clinic` is reserved; it is always rendered from the constructor value.
    pub(crate) fn with_trailer(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> IntakeResult<Self> {
        let key = key.into();
        if key.trim().eq_ignore_ascii_case(CLINIC_TRAILER) {
            return Err(IntakeError::ReservedClinicTrailerKey);
        }
        self.trailers.push(CommitTrailer::new(key, value)?);
        Ok(self)
    }

    pub(crate) fn render(&self) -> String {
        let mut rendered = format!(
            "{COMMIT_DOMAIN}:{}: {}\n\n{CLINIC_TRAILER}: {}",
            self.action,
            self.summary.as_str(),
            self.clinic.as_str()
        );

        let mut trailers = self.trailers.clone();
        trailers.sort_by(|a, b| (a.key(), a.value()).cmp(&(b.key(), b.value())));
        for trailer in trailers {
            rendered.push('\n');
            rendered.push_str(trailer.key());
            rendered.push_str(": ");
            rendered.push_str(trailer.value());
        }
        rendered
    }
}

/// A file to write and commit.
#[derive(Debug, Clone)]
pub(crate) struct FileToWrite<'a> {
    /// Path relative to the repository working directory.
    pub relative_path: &'a Path,
    pub content: &'a str,
    /// Previous content for rollback; `None` for a new file.
    pub old_content: Option<&'a str>,
}

/// Git operations on one repository working directory.
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    pub(crate) fn init(workdir: &Path) -> IntakeResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(IntakeError::GitInit)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| {
                IntakeError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Open the repository at exactly `workdir`, without searching parent directories.
    pub(crate) fn open(workdir: &Path) -> IntakeResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(IntakeError::GitOpen)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| {
                IntakeError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Write `files` and commit them in one commit, rolling back on failure.
    ///
    /// On error, files that existed are restored, new files are removed, and directories
    /// created by this call are removed (deepest first).
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        author: &CommitAuthor,
        msg: &IntakeCommitMessage,
        files: &[FileToWrite],
    ) -> IntakeResult<git2::Oid> {
        for file in files {
            check_relative(file.relative_path)?;
        }
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written_files: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: IntakeResult<git2::Oid> = (|| {
            let mut dirs_needed = std::collections::HashSet::new();
            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                let mut current = full_path.parent();
                while let Some(dir) = current {
                    if dir == repo.workdir || dir.exists() {
                        break;
                    }
                    dirs_needed.insert(dir.to_path_buf());
                    current = dir.parent();
                }
            }

            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());
            for dir in &dirs_to_create {
                std::fs::create_dir(dir).map_err(IntakeError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                std::fs::write(&full_path, file.content).map_err(IntakeError::FileWrite)?;
                written_files.push((full_path, file.old_content.map(str::to_string)));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(author, &msg.render(), &paths)
        })();

        if result.is_err() {
            for (full_path, old_content) in written_files.iter().rev() {
                let _ = match old_content {
                    Some(contents) => std::fs::write(full_path, contents),
                    None => std::fs::remove_file(full_path),
                };
            }
            for dir in created_dirs.iter().rev() {
                let _ = std::fs::remove_dir(dir);
            }
        }
        result
    }

    /// Initialise a repository in a new `dir`, write and commit `files`, and remove `dir`
    /// entirely if anything fails.
    pub(crate) fn init_and_commit(
        dir: &Path,
        author: &CommitAuthor,
        msg: &IntakeCommitMessage,
        files: &[FileToWrite],
    ) -> IntakeResult<git2::Oid> {
        let result = Self::init(dir)
            .and_then(|_| Self::write_and_commit_files(dir, author, msg, files));

        if let Err(err) = &result {
            if let Err(cleanup_err) = std::fs::remove_dir_all(dir) {
                tracing::warn!(
                    path = %dir.display(),
                    error = %err,
                    cleanup_error = %cleanup_err,
                    "failed to remove repository after failed initialisation"
                );
            }
        }
        result
    }

    /// Commit messages on `main`, newest first.
    pub(crate) fn commit_messages(&self) -> IntakeResult<Vec<String>> {
        if self.resolve_head_parents()?.is_empty() {
            return Ok(Vec::new());
        }
        let mut walk = self.repo.revwalk().map_err(IntakeError::GitRevwalk)?;
        walk.push_head().map_err(IntakeError::GitRevwalk)?;

        let mut messages = Vec::new();
        for oid in walk {
            let oid = oid.map_err(IntakeError::GitRevwalk)?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(IntakeError::GitRevwalk)?;
            messages.push(commit.message().unwrap_or_default().to_string());
        }
        Ok(messages)
    }

    fn ensure_main_head(&self) -> IntakeResult<()> {
        self.repo
            .set_head(MAIN_REF)
            .map_err(IntakeError::GitSetHead)
    }

    /// Stage `relative_paths` and commit them with `message`.
    ///
    /// Absolute paths under the working directory are accepted; paths with `..` are not.
    fn commit_paths(
        &self,
        author: &CommitAuthor,
        message: &str,
        relative_paths: &[PathBuf],
    ) -> IntakeResult<git2::Oid> {
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(IntakeError::GitIndex)?;

        for path in relative_paths {
            let rel = if path.is_absolute() {
                path.strip_prefix(&self.workdir)
                    .map_err(|_| {
                        IntakeError::InvalidInput(
                            "path is outside the repository working directory".into(),
                        )
                    })?
                    .to_path_buf()
            } else {
                path.clone()
            };

            check_relative(&rel)?;
            index.add_path(&rel).map_err(IntakeError::GitAdd)?;
        }
        index.write().map_err(IntakeError::GitIndex)?;

        let tree_id = index.write_tree().map_err(IntakeError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(IntakeError::GitFindTree)?;
        let sig = git2::Signature::now(author.name.as_str(), author.email.as_str())
            .map_err(IntakeError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(IntakeError::GitCommit)
    }

    /// `HEAD`'s commit, or nothing for a repository without commits.
    fn resolve_head_parents(&self) -> IntakeResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(IntakeError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(IntakeError::GitHead(e)),
        }
    }
}

fn check_relative(path: &Path) -> IntakeResult<()> {
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(IntakeError::InvalidInput(
            "path must be relative and must not contain parent directory references (..)".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_types::EmailAddress;
    use tempfile::TempDir;

    fn author() -> CommitAuthor {
        CommitAuthor {
            name: NonEmptyText::new("Intake Desk").unwrap(),
            email: EmailAddress::parse("intake@clinic.example.edu").unwrap(),
        }
    }

    fn message() -> IntakeCommitMessage {
        IntakeCommitMessage::new(CommitAction::Create, "Profile created", "Main Campus Clinic")
            .unwrap()
    }

    #[test]
    fn render_puts_clinic_first_and_sorts_trailers() {
        let msg = message()
            .with_trailer("Version", "1")
            .unwrap()
            .with_trailer("Term", "2024-2025 1st Semester")
            .unwrap();
        assert_eq!(
            msg.render(),
            "profile:create: Profile created\n\nClinic: Main Campus Clinic\nTerm: 2024-2025 1st Semester\nVersion: 1"
        );
    }

    #[test]
    fn rejects_bad_messages() {
        assert!(IntakeCommitMessage::new(CommitAction::Update, "two\nlines", "Clinic").is_err());
        assert!(matches!(
            IntakeCommitMessage::new(CommitAction::Update, "ok", " "),
            Err(IntakeError::InvalidClinic)
        ));
        assert!(matches!(
            message().with_trailer("clinic", "Other"),
            Err(IntakeError::ReservedClinicTrailerKey)
        ));
        assert!(message().with_trailer("Bad:Key", "x").is_err());
        assert!(message().with_trailer("Term", "").is_err());
    }

    #[test]
    fn save_modes_map_to_actions() {
        assert_eq!(CommitAction::from(SaveMode::Create).as_str(), "create");
        assert_eq!(CommitAction::from(SaveMode::Update).as_str(), "update");
        assert_eq!(CommitAction::from(SaveMode::CreateVersion).as_str(), "version");
    }

    #[test]
    fn init_and_commit_writes_one_commit() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("patient");
        let path = Path::new("records/a.yaml");
        VersionedFileService::init_and_commit(
            &dir,
            &author(),
            &message(),
            &[FileToWrite {
                relative_path: path,
                content: "first_name: Ana\n",
                old_content: None,
            }],
        )
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.join(path)).unwrap(),
            "first_name: Ana\n"
        );
        let messages = VersionedFileService::open(&dir)
            .unwrap()
            .commit_messages()
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("profile:create: Profile created"));
    }

    #[test]
    fn failed_write_rolls_back() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("patient");
        let existing = Path::new("records/a.yaml");
        VersionedFileService::init_and_commit(
            &dir,
            &author(),
            &message(),
            &[FileToWrite {
                relative_path: existing,
                content: "v1\n",
                old_content: None,
            }],
        )
        .unwrap();

        let update =
            IntakeCommitMessage::new(CommitAction::Update, "Profile updated", "Main Campus Clinic")
                .unwrap();

        // The last file's parent is a regular file, so its write fails after the first two
        // have landed.
        let err = VersionedFileService::write_and_commit_files(
            &dir,
            &author(),
            &update,
            &[
                FileToWrite {
                    relative_path: existing,
                    content: "v2\n",
                    old_content: Some("v1\n"),
                },
                FileToWrite {
                    relative_path: Path::new("notes/new.yaml"),
                    content: "x\n",
                    old_content: None,
                },
                FileToWrite {
                    relative_path: Path::new("records/a.yaml/inner.yaml"),
                    content: "x\n",
                    old_content: None,
                },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, IntakeError::FileWrite(_)));

        assert_eq!(std::fs::read_to_string(dir.join(existing)).unwrap(), "v1\n");
        assert!(!dir.join("notes").exists());
        let messages = VersionedFileService::open(&dir)
            .unwrap()
            .commit_messages()
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn paths_outside_the_repository_are_rejected_before_writing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("patient");
        VersionedFileService::init(&dir).unwrap();

        let err = VersionedFileService::write_and_commit_files(
            &dir,
            &author(),
            &message(),
            &[FileToWrite {
                relative_path: Path::new("../outside.yaml"),
                content: "x\n",
                old_content: None,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidInput(_)));
        assert!(!temp.path().join("outside.yaml").exists());
    }
}
