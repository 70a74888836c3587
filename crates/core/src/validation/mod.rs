//! Step validation for the intake wizard.
//!
//! Each step is validated on its own, with no memory of other steps. Failures are
//! user-correctable and come back as a [`FieldErrors`] map rather than an `Err`; the caller
//! shows every message of the step at once.
//!
//! The rules live in one submodule per step:
//! - [`identity`]: required-ness from the field policy, format checks, category-specific
//!   required fields, photo and nationality rules
//! - [`health`]: condition sub-options and specifications, medication rows, menstrual
//!   symptoms
//! - [`history`]: hospitalisation details and "other condition" text
//!
//! Whatever a rule module produces, [`StepValidator::validate`] drops keys the step does not
//! own before returning (see [`owner_of`]).

mod health;
mod history;
mod identity;

use crate::policy::{CategoryConfig, StaticDefaults};
use crate::record::Draft;
use crate::steps::Step;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Field → message map for one step. The first message recorded for a field wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only errors attributed to `step`.
    pub fn retain_owned_by(&mut self, step: Step, config: Option<&CategoryConfig>) {
        self.0.retain(|field, _| owner_of(field, config) == Some(step));
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Validates one wizard step at a time.
#[derive(Clone, Debug)]
pub struct StepValidator {
    defaults: StaticDefaults,
    today: Option<NaiveDate>,
}

impl Default for StepValidator {
    fn default() -> Self {
        Self::new(StaticDefaults::builtin())
    }
}

impl StepValidator {
    pub fn new(defaults: StaticDefaults) -> Self {
        Self {
            defaults,
            today: None,
        }
    }

    /// Pin the reference date used for date-of-birth checks (defaults to the local date).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn defaults(&self) -> &StaticDefaults {
        &self.defaults
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Validate `step` of `draft`. The result only ever contains fields owned by `step`.
    pub fn validate(
        &self,
        step: Step,
        draft: &Draft,
        config: Option<&CategoryConfig>,
    ) -> FieldErrors {
        let mut errors = match step {
            Step::Identity => identity::validate(draft, config, &self.defaults, self.today()),
            Step::HealthHistory => health::validate(draft.fields()),
            Step::MedicalHistory => history::validate(draft.fields()),
            Step::Review => FieldErrors::default(),
        };
        errors.retain_owned_by(step, config);
        errors
    }

    /// The first editable step with errors, in wizard order.
    pub fn first_failing_step(
        &self,
        draft: &Draft,
        config: Option<&CategoryConfig>,
    ) -> Option<(Step, FieldErrors)> {
        Step::EDITABLE.into_iter().find_map(|step| {
            let errors = self.validate(step, draft, config);
            (!errors.is_empty()).then_some((step, errors))
        })
    }
}

/// The step an error keyed by `field` belongs to. Fields the form does not model but the
/// category configuration requires are collected on the identity step.
pub fn owner_of(field: &str, config: Option<&CategoryConfig>) -> Option<Step> {
    Step::owner_of(field).or_else(|| {
        config
            .is_some_and(|c| c.required_fields.contains(field))
            .then_some(Step::Identity)
    })
}

/// Human label of a form field, used in messages.
pub(crate) fn label(field: &str) -> &'static str {
    match field {
        "first_name" => "First name",
        "middle_name" => "Middle name",
        "last_name" => "Last name",
        "suffix" => "Suffix",
        "sex" => "Sex",
        "date_of_birth" => "Date of birth",
        "email" => "Email address",
        "contact_number" => "Contact number",
        "address" => "Address",
        "nationality" => "Nationality",
        "nationality_specify" => "Nationality",
        "employee_id" => "Employee ID",
        "department" => "Department",
        "position_type" => "Position type",
        "course" => "Course",
        "year_level" => "Year level",
        "strand" => "Strand",
        "emergency_contact_name" => "Emergency contact name",
        "emergency_contact_number" => "Emergency contact number",
        _ => "This field",
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::record::{Draft, ProfileFields, ProfileRecord};
    use chrono::NaiveDate;
    use intake_types::{PatientId, TermId, UserCategory};

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    /// A draft whose identity step passes for a college student.
    pub fn valid_draft() -> Draft {
        let fields = ProfileFields {
            user_category: Some(UserCategory::College),
            first_name: "Maria".into(),
            middle_name: "de la".into(),
            last_name: "Santos-Reyes".into(),
            sex: "Female".into(),
            date_of_birth: "2004-03-09".into(),
            email: "maria.santos@student.example.edu".into(),
            contact_number: "09171234567".into(),
            address: "12 Mabini St, Iloilo City".into(),
            nationality: "Filipino".into(),
            course: "BS Nursing".into(),
            year_level: "2".into(),
            photo_url: Some("photos/2022-0456.jpg".into()),
            ..ProfileFields::default()
        };
        let mut record = ProfileRecord::blank(
            PatientId::parse("2022-0456").unwrap(),
            TermId::new("2024-2025 2nd Semester").unwrap(),
        );
        record.fields = fields;
        Draft::new(record)
    }
}
