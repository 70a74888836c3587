//! Builds the starting draft for a (patient, term).
//!
//! Lookup order: the term's own live record, then the patient's most recent record from any
//! other term (carried forward as an unsaved draft), then a blank draft seeded with the
//! signed-in user's name and email.

use crate::error::IntakeResult;
use crate::record::{Draft, ProfileRecord};
use crate::store::{IdentitySource, ProfileStore, UserIdentity};
use intake_types::{PatientId, TermId};

#[derive(Clone, Debug, PartialEq)]
pub struct AutofillOutcome {
    pub draft: Draft,
    /// The stored record of the target term, when one exists.
    pub live: Option<ProfileRecord>,
    /// Term the draft was copied from, for "pre-filled from ..." disclosure.
    pub provenance_term: Option<TermId>,
}

pub struct AutofillResolver;

impl AutofillResolver {
    pub async fn resolve(
        patient: &PatientId,
        term: &TermId,
        store: &dyn ProfileStore,
        identity: &dyn IdentitySource,
    ) -> IntakeResult<AutofillOutcome> {
        if let Some(record) = store.fetch(patient, term).await? {
            tracing::debug!(term = %term, version = ?record.version, "editing existing record");
            return Ok(AutofillOutcome {
                draft: Draft::new(record.clone()),
                live: Some(record),
                provenance_term: None,
            });
        }

        if let Some(prior) = store.fetch_latest_prior_any(patient).await? {
            tracing::debug!(from = %prior.term_id, to = %term, "carrying forward prior record");
            return Ok(AutofillOutcome {
                draft: Draft::new(carry_forward(&prior, term)),
                live: None,
                provenance_term: Some(prior.term_id),
            });
        }

        let user = match identity.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(error = %err, "identity unavailable; starting from a blank draft");
                UserIdentity::default()
            }
        };
        Ok(AutofillOutcome {
            draft: Draft::new(seeded(patient, term, &user)),
            live: None,
            provenance_term: None,
        })
    }
}

/// Copy of `source` re-targeted at `term` as an unsaved draft. `source` is not modified.
pub fn carry_forward(source: &ProfileRecord, term: &TermId) -> ProfileRecord {
    ProfileRecord {
        id: None,
        version: None,
        previous_version_id: None,
        term_id: term.clone(),
        saved_at: None,
        ..source.clone()
    }
}

/// Blank record pre-filled with the user's name parts and email.
pub fn seeded(patient: &PatientId, term: &TermId, user: &UserIdentity) -> ProfileRecord {
    let mut record = ProfileRecord::blank(patient.clone(), term.clone());
    let fields = &mut record.fields;
    fields.first_name = user.first_name.trim().to_owned();
    fields.middle_name = user.middle_name.trim().to_owned();
    fields.last_name = user.last_name.trim().to_owned();
    fields.email = user.email.trim().to_owned();
    record
}
