//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the stores and
//! the orchestrator. Library code never reads process-wide environment variables; binaries
//! do that and hand the values to [`CoreConfig::new`].

use crate::constants::{DEFAULT_CATEGORY_CONFIG_DIR, DEFAULT_PROFILE_DATA_DIR, PROFILES_DIR_NAME};
use crate::{IntakeError, IntakeResult};
use intake_types::{EmailAddress, NonEmptyText};
use std::path::{Path, PathBuf};

/// Identity recorded on every git commit the file-backed store creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: NonEmptyText,
    pub email: EmailAddress,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    profile_data_dir: PathBuf,
    category_config_dir: PathBuf,
    clinic: NonEmptyText,
    commit_author: CommitAuthor,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `clinic` is written into commit trailers, so it must be a single line.
    pub fn new(
        profile_data_dir: PathBuf,
        category_config_dir: PathBuf,
        clinic: &str,
        commit_author: CommitAuthor,
    ) -> IntakeResult<Self> {
        let clinic = NonEmptyText::single_line(clinic).map_err(|_| IntakeError::InvalidClinic)?;

        Ok(Self {
            profile_data_dir,
            category_config_dir,
            clinic,
            commit_author,
        })
    }

    pub fn profile_data_dir(&self) -> &Path {
        &self.profile_data_dir
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.profile_data_dir.join(PROFILES_DIR_NAME)
    }

    pub fn category_config_dir(&self) -> &Path {
        &self.category_config_dir
    }

    pub fn clinic(&self) -> &NonEmptyText {
        &self.clinic
    }

    pub fn commit_author(&self) -> &CommitAuthor {
        &self.commit_author
    }
}

/// Resolve a directory from an optional override value, falling back to `default`.
///
/// Empty or whitespace-only values count as unset.
pub fn dir_from_env_value(value: Option<String>, default: &str) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Profile data directory from an optional environment value.
pub fn profile_data_dir_from_env_value(value: Option<String>) -> PathBuf {
    dir_from_env_value(value, DEFAULT_PROFILE_DATA_DIR)
}

/// Category configuration directory from an optional environment value.
pub fn category_config_dir_from_env_value(value: Option<String>) -> PathBuf {
    dir_from_env_value(value, DEFAULT_CATEGORY_CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> CommitAuthor {
        CommitAuthor {
            name: NonEmptyText::new("Intake Desk").unwrap(),
            email: EmailAddress::parse("intake@clinic.example.edu").unwrap(),
        }
    }

    #[test]
    fn new_rejects_blank_or_multiline_clinic() {
        let err = CoreConfig::new("a".into(), "b".into(), "  ", author())
            .expect_err("blank clinic should fail");
        assert!(matches!(err, IntakeError::InvalidClinic));

        let err = CoreConfig::new("a".into(), "b".into(), "Main\nAnnex", author())
            .expect_err("multiline clinic should fail");
        assert!(matches!(err, IntakeError::InvalidClinic));
    }

    #[test]
    fn profiles_dir_is_under_data_dir() {
        let cfg = CoreConfig::new("/data".into(), "/cfg".into(), "Main Clinic", author()).unwrap();
        assert_eq!(cfg.profiles_dir(), PathBuf::from("/data/profiles"));
        assert_eq!(cfg.clinic().as_str(), "Main Clinic");
    }

    #[test]
    fn env_values_fall_back_to_defaults() {
        assert_eq!(
            profile_data_dir_from_env_value(None),
            PathBuf::from(DEFAULT_PROFILE_DATA_DIR)
        );
        assert_eq!(
            category_config_dir_from_env_value(Some("   ".into())),
            PathBuf::from(DEFAULT_CATEGORY_CONFIG_DIR)
        );
        assert_eq!(
            profile_data_dir_from_env_value(Some(" /srv/intake ".into())),
            PathBuf::from("/srv/intake")
        );
    }
}
