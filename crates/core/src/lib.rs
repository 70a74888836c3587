//! # Intake Core
//!
//! The versioned profile intake engine: a four-step wizard that builds a patient's health
//! profile for an academic term, validates each step, and saves it either over the live
//! record or as a new version linked to the previous one.
//!
//! Engine logic (policy, validation, registry, versioning) is synchronous and does no I/O.
//! Storage, category configuration and the signed-in user are reached through the async
//! traits in [`store`]; [`repositories`] provides file-backed, git-audited implementations.
//!
//! Binaries resolve a [`CoreConfig`] once at startup; nothing in this crate reads the
//! environment.

pub mod autofill;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod record;
pub mod registry;
pub mod repositories;
pub mod steps;
pub mod store;
pub mod validation;
pub mod versioning;

pub(crate) mod versioned_files;

pub use autofill::{AutofillOutcome, AutofillResolver};
pub use config::{CommitAuthor, CoreConfig};
pub use error::{IntakeError, IntakeResult};
pub use intake_types::{
    normalize_key, EmailAddress, NonEmptyText, PatientId, RecordId, TermId, TextError,
    UserCategory,
};
pub use orchestrator::{IntakeSession, LoadTicket, ProfileOrchestrator, SubmitOutcome};
pub use policy::{CategoryConfig, FieldPolicy, StaticDefaults};
pub use record::{ConditionSelection, Draft, MedicationRow, ProfileFields, ProfileRecord};
pub use registry::{CustomValueRegistry, Slot};
pub use repositories::{FileConfigStore, FileProfileStore};
pub use steps::Step;
pub use store::{
    ConfigStore, IdentitySource, InMemoryConfigStore, InMemoryProfileStore, ProfileStore,
    SaveMode, StaticIdentity, UserIdentity,
};
pub use validation::{FieldErrors, StepValidator};
pub use versioning::{SaveAction, VersionChoice};
