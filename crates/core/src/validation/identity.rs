//! Identity and contact rules.

use super::{label, FieldErrors};
use crate::constants::{MAX_PATIENT_AGE, MIN_NAME_LEN, MIN_PATIENT_AGE};
use crate::policy::{self, CategoryConfig, OptionSlot, StaticDefaults};
use crate::record::{Draft, ProfileFields};
use crate::steps::{Step, IDENTITY_FIELDS};
use chrono::{Datelike, NaiveDate};
use intake_types::UserCategory;
use regex::Regex;
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z .'\-]+$").expect("name pattern is valid"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^09\d{9}$").expect("phone pattern is valid"));

const NAME_FIELDS: [&str; 4] = ["first_name", "middle_name", "last_name", "emergency_contact_name"];
const PHONE_FIELDS: [&str; 2] = ["contact_number", "emergency_contact_number"];

pub(super) fn validate(
    draft: &Draft,
    config: Option<&CategoryConfig>,
    defaults: &StaticDefaults,
    today: NaiveDate,
) -> FieldErrors {
    let fields = draft.fields();
    let mut errors = FieldErrors::default();

    // The photo is checked against the draft below, not as text.
    for &field in IDENTITY_FIELDS.iter().filter(|&&f| f != "photo") {
        let policy = policy::resolve(config, field, Step::Identity, defaults);
        if policy.required && !fields.is_filled(field) {
            errors.insert(field, required(field));
        }
    }

    // Fields the form does not model, kept in the passthrough map.
    let configured = config.map(|c| &c.required_fields).into_iter().flatten();
    for field in configured.filter(|f| Step::owner_of(f).is_none()) {
        if !fields.is_filled(field) {
            errors.insert(field.as_str(), format!("{} is required.", humanize(field)));
        }
    }

    for field in category_required_fields(fields.user_category) {
        if !fields.is_filled(field) {
            errors.insert(field, required(field));
        }
    }

    for field in NAME_FIELDS {
        let value = fields.text(field).unwrap_or_default().trim();
        if value.is_empty() {
            continue;
        }
        if !NAME_RE.is_match(value) {
            errors.insert(
                field,
                format!(
                    "{} may only contain letters, spaces, periods, apostrophes and hyphens.",
                    label(field)
                ),
            );
        } else if value.chars().count() < MIN_NAME_LEN {
            errors.insert(
                field,
                format!(
                    "{} must be at least {MIN_NAME_LEN} characters.",
                    label(field)
                ),
            );
        }
    }

    let email = fields.email.trim();
    if !email.is_empty() && !EMAIL_RE.is_match(email) {
        errors.insert("email", "Enter a valid email address.");
    }

    for field in PHONE_FIELDS {
        let value = fields.text(field).unwrap_or_default().trim();
        if !value.is_empty() && !PHONE_RE.is_match(value) {
            errors.insert(
                field,
                format!("{} must start with 09 and have 11 digits.", label(field)),
            );
        }
    }

    if let Some(message) = date_of_birth_error(&fields.date_of_birth, today) {
        errors.insert("date_of_birth", message);
    }

    if !draft.has_photo() {
        errors.insert("photo", "Please upload a profile photo.");
    }

    if fields.has_foreign_nationality() && fields.nationality_specify.trim().is_empty() {
        errors.insert("nationality_specify", "Please specify your nationality.");
    }

    if let Some(config) = config {
        check_allowed_options(fields, config, &mut errors);
    }

    errors
}

fn required(field: &str) -> String {
    format!("{} is required.", label(field))
}

/// `civil_status` → `Civil status`.
fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

/// Fields a category needs on top of whatever the policy requires.
fn category_required_fields(category: Option<UserCategory>) -> Vec<&'static str> {
    let Some(category) = category else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    if category == UserCategory::Employee {
        fields.extend(["employee_id", "department", "position_type"]);
    }
    if category.is_collegiate() {
        fields.push("course");
        // Incoming freshmen are placed in year 1 automatically.
        if category != UserCategory::IncomingFreshman {
            fields.push("year_level");
        }
    }
    if category.is_secondary() {
        fields.push("year_level");
        if category.is_senior_secondary() {
            fields.push("strand");
        }
    }
    fields
}

fn date_of_birth_error(raw: &str, today: NaiveDate) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Ok(dob) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
        return Some("Enter a valid date of birth (YYYY-MM-DD).".into());
    };
    if dob > today {
        return Some("Date of birth cannot be in the future.".into());
    }

    let age = age_on(dob, today);
    if !(MIN_PATIENT_AGE..=MAX_PATIENT_AGE).contains(&age) {
        return Some(format!(
            "Age must be between {MIN_PATIENT_AGE} and {MAX_PATIENT_AGE} years."
        ));
    }
    None
}

/// Completed years between `dob` and `today`; zero when `dob` is later.
fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    u32::try_from(age).unwrap_or(0)
}

fn check_allowed_options(fields: &ProfileFields, config: &CategoryConfig, errors: &mut FieldErrors) {
    for slot in OptionSlot::ALL {
        let field = slot.field_name();
        let Some(allowed) = config.options_for(slot) else {
            continue;
        };
        let value = fields.text(field).unwrap_or_default().trim();
        if value.is_empty() || allowed.is_empty() {
            continue;
        }
        if !allowed.iter().any(|option| option.eq_ignore_ascii_case(value)) {
            errors.insert(field, format!("Select a valid {}.", label(field).to_lowercase()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::fixtures::{today, valid_draft};
    use serde_json::json;

    fn run(draft: &Draft, config: Option<&CategoryConfig>) -> FieldErrors {
        validate(draft, config, &StaticDefaults::builtin(), today())
    }

    #[test]
    fn foreign_nationality_without_specification_is_the_only_error() {
        let mut draft = valid_draft();
        draft.fields_mut().nationality = "Foreigner".into();

        let errors = run(&draft, None);
        assert_eq!(
            errors.into_inner().into_iter().collect::<Vec<_>>(),
            vec![(
                "nationality_specify".to_string(),
                "Please specify your nationality.".to_string()
            )]
        );

        draft.fields_mut().nationality_specify = "Korean".into();
        assert!(run(&draft, None).is_empty());
    }

    #[test]
    fn required_fields_from_defaults_and_config() {
        let mut draft = valid_draft();
        draft.fields_mut().address.clear();
        draft.fields_mut().middle_name.clear();

        let errors = run(&draft, None);
        assert_eq!(errors.get("address"), Some("Address is required."));
        assert!(!errors.contains("middle_name"));

        let config = CategoryConfig::from_value(&json!({ "required": ["Middle Name"] })).unwrap();
        let errors = run(&draft, Some(&config));
        assert_eq!(errors.get("middle_name"), Some("Middle name is required."));
    }

    #[test]
    fn configured_fields_outside_the_form_are_required_too() {
        let mut draft = valid_draft();
        let config = CategoryConfig::from_value(&json!({
            "required_fields": ["Civil Status", "userCategory"]
        }))
        .unwrap();

        let errors = run(&draft, Some(&config));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("civil_status"), Some("Civil status is required."));

        draft
            .fields_mut()
            .extra
            .insert("civil_status".into(), json!("Single"));
        assert!(run(&draft, Some(&config)).is_empty());

        draft.fields_mut().user_category = None;
        assert_eq!(
            run(&draft, Some(&config)).get("user_category"),
            Some("User category is required.")
        );
    }

    #[test]
    fn name_format_and_length() {
        let mut draft = valid_draft();
        draft.fields_mut().first_name = "M4ria".into();
        draft.fields_mut().last_name = "O".into();
        draft.fields_mut().middle_name = "D'Angelo-Cruz Jr.".into();

        let errors = run(&draft, None);
        assert!(errors.get("first_name").unwrap().contains("only contain letters"));
        assert!(errors.get("last_name").unwrap().contains("at least 2"));
        assert!(!errors.contains("middle_name"));
    }

    #[test]
    fn email_and_phone_formats() {
        let mut draft = valid_draft();
        draft.fields_mut().email = "maria@localhost".into();
        draft.fields_mut().contact_number = "0917123456".into();
        draft.fields_mut().emergency_contact_number = "+639171234567".into();

        let errors = run(&draft, None);
        assert!(errors.contains("email"));
        assert!(errors.contains("contact_number"));
        assert!(errors.contains("emergency_contact_number"));

        draft.fields_mut().email = "maria.s+clinic@mail.school.edu.ph".into();
        draft.fields_mut().contact_number = "09998887777".into();
        draft.fields_mut().emergency_contact_number.clear();
        assert!(run(&draft, None).is_empty());
    }

    #[test]
    fn date_of_birth_rules() {
        let today = today();
        assert_eq!(date_of_birth_error("2004-03-09", today), None);
        assert!(date_of_birth_error("09/03/2004", today)
            .unwrap()
            .contains("valid date"));
        assert!(date_of_birth_error("2025-06-16", today)
            .unwrap()
            .contains("future"));
        assert!(date_of_birth_error("2022-06-16", today)
            .unwrap()
            .contains("between 3 and 120"));
        assert_eq!(date_of_birth_error("2022-06-15", today), None);
        assert!(date_of_birth_error("1900-01-01", today).is_some());
    }

    #[test]
    fn age_counts_completed_years() {
        let dob = NaiveDate::from_ymd_opt(2000, 6, 16).unwrap();
        assert_eq!(age_on(dob, today()), 24);
        let dob = NaiveDate::from_ymd_opt(2000, 6, 15).unwrap();
        assert_eq!(age_on(dob, today()), 25);
    }

    #[test]
    fn photo_required_until_one_exists() {
        let mut draft = valid_draft();
        draft.fields_mut().photo_url = None;
        assert!(run(&draft, None).contains("photo"));

        draft.photo_attached = true;
        assert!(!run(&draft, None).contains("photo"));
    }

    #[test]
    fn category_specific_requirements() {
        let mut draft = valid_draft();

        draft.fields_mut().user_category = Some(UserCategory::Employee);
        let errors = run(&draft, None);
        for field in ["employee_id", "department", "position_type"] {
            assert!(errors.contains(field), "{field} missing for employee");
        }

        draft.fields_mut().user_category = Some(UserCategory::IncomingFreshman);
        draft.fields_mut().year_level.clear();
        assert!(run(&draft, None).is_empty());

        draft.fields_mut().user_category = Some(UserCategory::College);
        assert!(run(&draft, None).contains("year_level"));

        draft.fields_mut().user_category = Some(UserCategory::SeniorHigh);
        draft.fields_mut().year_level = "11".into();
        let errors = run(&draft, None);
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["strand"]);

        draft.fields_mut().user_category = Some(UserCategory::JuniorHigh);
        assert!(run(&draft, None).is_empty());
    }

    #[test]
    fn configured_options_constrain_values() {
        let config =
            CategoryConfig::from_value(&json!({ "courses": ["BS Nursing", "BS Biology"] }))
                .unwrap();
        let mut draft = valid_draft();
        draft.fields_mut().course = "bs nursing".into();
        assert!(run(&draft, Some(&config)).is_empty());

        draft.fields_mut().course = "BS Astronomy".into();
        assert_eq!(
            run(&draft, Some(&config)).get("course"),
            Some("Select a valid course.")
        );
    }
}
