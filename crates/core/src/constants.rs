//! Constants used throughout the intake core crate.

/// Directory (under the data dir) holding one git-versioned folder per patient.
pub const PROFILES_DIR_NAME: &str = "profiles";

/// Folder (inside a patient folder) holding one YAML file per record version.
pub const RECORDS_DIR_NAME: &str = "records";

/// Default directory for profile data when no explicit directory is configured.
pub const DEFAULT_PROFILE_DATA_DIR: &str = "profile_data";

/// Default directory for per-category configuration files.
pub const DEFAULT_CATEGORY_CONFIG_DIR: &str = "category_config";

/// File (inside the category config dir) naming the active academic term.
pub const ACTIVE_TERM_FILENAME: &str = "term.yaml";

/// Extension of record and config files.
pub const YAML_EXTENSION: &str = "yaml";

/// Git ignore written into each new patient repository.
pub const DEFAULT_GITIGNORE: &str = ".DS_Store\n*.tmp\n";

/// Age bounds implied by a date of birth, inclusive.
pub const MIN_PATIENT_AGE: u32 = 3;
pub const MAX_PATIENT_AGE: u32 = 120;

/// Minimum length of a typed name part and of free-text medication fields.
pub const MIN_NAME_LEN: usize = 2;
pub const MIN_CUSTOM_MEDICATION_TEXT_LEN: usize = 3;

/// Year level assigned to incoming freshmen, who are not asked for one.
pub const FRESHMAN_YEAR_LEVEL: &str = "1";
