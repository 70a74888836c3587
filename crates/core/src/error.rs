use intake_types::{RecordId, TermId, TextError};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid value: {0}")]
    Text(#[from] TextError),

    #[error("profile record not found: {0}")]
    RecordNotFound(RecordId),
    #[error(
        "profile for term {term} changed since it was loaded (expected latest {expected_id}, found {found_id})",
        expected_id = display_id(.expected),
        found_id = display_id(.found)
    )]
    Conflict {
        term: TermId,
        expected: Option<RecordId>,
        found: Option<RecordId>,
    },
    #[error("version chain is broken: {0}")]
    BrokenLineage(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write profile file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read profile file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),
    #[error("failed to walk git history: {0}")]
    GitRevwalk(git2::Error),

    #[error("invalid Clinic")]
    InvalidClinic,
    #[error("Clinic trailer key is reserved")]
    ReservedClinicTrailerKey,
}

impl IntakeError {
    /// True for a lost-update rejection the user can resolve by reloading and resubmitting.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn display_id(id: &Option<RecordId>) -> String {
    id.as_ref()
        .map(RecordId::to_string)
        .unwrap_or_else(|| "none".into())
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;
