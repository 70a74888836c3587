//! Intake sessions: loading a draft, moving through the wizard, and submitting.
//!
//! [`ProfileOrchestrator`] owns the collaborators and the step validator. It opens an
//! [`IntakeSession`] per patient visit and drives it; the session owns the draft and nothing
//! else touches it.
//!
//! ## Loading
//!
//! 1. Resolve the term (given, or the config store's active term).
//! 2. Fetch the category configuration and run autofill concurrently.
//! 3. Discard the result if the load was superseded in the meantime.
//!
//! Fetch failures never abort a load: a failed config fetch falls back to the static defaults
//! and a failed profile fetch falls back to a blank draft, both with a warning.

use crate::autofill::{self, AutofillOutcome, AutofillResolver};
use crate::constants::FRESHMAN_YEAR_LEVEL;
use crate::error::{IntakeError, IntakeResult};
use crate::policy::CategoryConfig;
use crate::record::{Draft, ProfileRecord};
use crate::steps::Step;
use crate::store::{ConfigStore, IdentitySource, ProfileStore, SaveMode, UserIdentity};
use crate::validation::{FieldErrors, StepValidator};
use crate::versioning::{self, VersionChoice};
use intake_types::{PatientId, TermId, UserCategory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// SESSION
// ============================================================================

/// One patient's pass through the intake wizard.
#[derive(Clone, Debug)]
pub struct IntakeSession {
    patient: PatientId,
    term: TermId,
    step: Step,
    draft: Draft,
    live: Option<ProfileRecord>,
    config: Option<CategoryConfig>,
    provenance_term: Option<TermId>,
    errors: FieldErrors,
}

impl IntakeSession {
    pub fn patient(&self) -> &PatientId {
        &self.patient
    }

    pub fn term(&self) -> &TermId {
        &self.term
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut Draft {
        &mut self.draft
    }

    /// The stored record this session would update or fork, if any.
    pub fn live(&self) -> Option<&ProfileRecord> {
        self.live.as_ref()
    }

    pub fn config(&self) -> Option<&CategoryConfig> {
        self.config.as_ref()
    }

    /// Term the draft was pre-filled from, when it came from another term.
    pub fn provenance_term(&self) -> Option<&TermId> {
        self.provenance_term.as_ref()
    }

    /// Errors of the current step from the last validation.
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }
}

/// Result of [`ProfileOrchestrator::submit`].
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Saved { record: ProfileRecord, mode: SaveMode },
    /// A record already exists for the term; the user must choose update or fork.
    NeedsChoice,
    /// A step failed validation; the session has moved to it.
    Invalid { step: Step, errors: FieldErrors },
    /// The stored record changed since it was loaded; reload and resubmit.
    Conflict { message: String },
}

/// Identity of one load request. Stale tickets are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket(u64);

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct ProfileOrchestrator {
    profiles: Arc<dyn ProfileStore>,
    configs: Arc<dyn ConfigStore>,
    identity: Arc<dyn IdentitySource>,
    validator: StepValidator,
    generation: AtomicU64,
}

impl ProfileOrchestrator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        configs: Arc<dyn ConfigStore>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        Self {
            profiles,
            configs,
            identity,
            validator: StepValidator::default(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_validator(mut self, validator: StepValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn validator(&self) -> &StepValidator {
        &self.validator
    }

    /// Start a load, superseding any load still in flight.
    pub fn begin(&self) -> LoadTicket {
        LoadTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Supersede the load in flight, e.g. when the user navigates away.
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, ticket: LoadTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Open a session, superseding any earlier load.
    ///
    /// # Arguments
    ///
    /// * `term` - Term to file under; the active term when `None`.
    /// * `category` - The patient's user category, if known up front. Otherwise the category
    ///   stored on the loaded draft is used.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no term is given and none is active; store errors from term
    /// resolution. Returns `Ok(None)` when the load was superseded before it finished.
    pub async fn open(
        &self,
        patient: &PatientId,
        term: Option<TermId>,
        category: Option<UserCategory>,
    ) -> IntakeResult<Option<IntakeSession>> {
        let ticket = self.begin();
        self.load(ticket, patient, term, category).await
    }

    /// Run the load for `ticket`. See [`Self::open`].
    pub async fn load(
        &self,
        ticket: LoadTicket,
        patient: &PatientId,
        term: Option<TermId>,
        category: Option<UserCategory>,
    ) -> IntakeResult<Option<IntakeSession>> {
        let term = match term {
            Some(term) => term,
            None => self.configs.active_term().await?.ok_or_else(|| {
                IntakeError::InvalidInput("no term given and no active term configured".into())
            })?,
        };
        if !self.is_current(ticket) {
            tracing::debug!(?ticket, "load superseded during term resolution");
            return Ok(None);
        }

        let (config, autofilled) = tokio::join!(
            self.fetch_config(category),
            AutofillResolver::resolve(
                patient,
                &term,
                self.profiles.as_ref(),
                self.identity.as_ref()
            ),
        );
        if !self.is_current(ticket) {
            tracing::debug!(?ticket, "load superseded during fetch");
            return Ok(None);
        }

        let AutofillOutcome {
            mut draft,
            live,
            provenance_term,
        } = autofilled.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "profile fetch failed; starting from a blank draft");
            AutofillOutcome {
                draft: Draft::new(autofill::seeded(patient, &term, &UserIdentity::default())),
                live: None,
                provenance_term: None,
            }
        });

        if let Some(category) = category {
            draft.fields_mut().user_category = Some(category);
        }
        let config = match (config, category, draft.fields().user_category) {
            (config, Some(_), _) => config,
            (_, None, Some(stored)) => self.fetch_config(Some(stored)).await,
            (_, None, None) => None,
        };
        if !self.is_current(ticket) {
            return Ok(None);
        }

        if draft.fields().user_category == Some(UserCategory::IncomingFreshman) {
            draft.fields_mut().year_level = FRESHMAN_YEAR_LEVEL.to_owned();
        }

        tracing::info!(
            term = %term,
            existing = live.is_some(),
            prefilled_from = ?provenance_term.as_ref().map(TermId::as_str),
            "opened intake session"
        );
        Ok(Some(IntakeSession {
            patient: patient.clone(),
            term,
            step: Step::Identity,
            draft,
            live,
            config,
            provenance_term,
            errors: FieldErrors::default(),
        }))
    }

    async fn fetch_config(&self, category: Option<UserCategory>) -> Option<CategoryConfig> {
        let category = category?;
        match self.configs.category_config(category).await {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(%category, error = %err, "category config unavailable; using defaults");
                None
            }
        }
    }

    /// Validate the current step and move forward when it is clean.
    ///
    /// Returns `true` when the session moved.
    pub fn advance(&self, session: &mut IntakeSession) -> bool {
        let errors = self
            .validator
            .validate(session.step, &session.draft, session.config.as_ref());
        if !errors.is_empty() {
            tracing::debug!(step = %session.step, errors = errors.len(), "step has errors");
            session.errors = errors;
            return false;
        }
        session.errors = FieldErrors::default();
        match session.step.next() {
            Some(next) => {
                session.step = next;
                true
            }
            None => false,
        }
    }

    /// Move back one step without validating.
    pub fn back(&self, session: &mut IntakeSession) -> bool {
        match session.step.previous() {
            Some(previous) => {
                session.step = previous;
                session.errors = FieldErrors::default();
                true
            }
            None => false,
        }
    }

    /// Jump to `step` and show its errors, if any.
    pub fn go_to<'s>(&self, session: &'s mut IntakeSession, step: Step) -> &'s FieldErrors {
        session.step = step;
        session.errors = self
            .validator
            .validate(step, &session.draft, session.config.as_ref());
        &session.errors
    }

    /// Validate every step, decide how to save, remember custom values, and save.
    ///
    /// # Errors
    ///
    /// Store failures other than a conflict. Conflicts come back as
    /// [`SubmitOutcome::Conflict`].
    pub async fn submit(
        &self,
        session: &mut IntakeSession,
        choice: VersionChoice,
    ) -> IntakeResult<SubmitOutcome> {
        if let Some((step, errors)) = self
            .validator
            .first_failing_step(&session.draft, session.config.as_ref())
        {
            session.step = step;
            session.errors = errors.clone();
            return Ok(SubmitOutcome::Invalid { step, errors });
        }

        let action = versioning::decide(session.live.as_ref(), choice)?;
        let Some((mut record, mode)) =
            versioning::prepare(action, &session.draft, session.live.as_ref())
        else {
            return Ok(SubmitOutcome::NeedsChoice);
        };
        record.custom_registry.harvest(&record.fields);

        match self.profiles.save(record, mode).await {
            Ok(saved) => {
                tracing::info!(
                    term = %saved.term_id,
                    version = ?saved.version,
                    mode = mode.as_str(),
                    "saved profile"
                );
                session.draft = Draft {
                    record: saved.clone(),
                    photo_attached: session.draft.photo_attached,
                };
                session.live = Some(saved.clone());
                session.provenance_term = None;
                session.errors = FieldErrors::default();
                Ok(SubmitOutcome::Saved {
                    record: saved,
                    mode,
                })
            }
            Err(err) if err.is_conflict() => {
                tracing::warn!(error = %err, "save rejected as stale");
                Ok(SubmitOutcome::Conflict {
                    message: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
