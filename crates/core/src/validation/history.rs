//! Medical and family history rules.

use super::FieldErrors;
use crate::record::ProfileFields;

pub(super) fn validate(fields: &ProfileFields) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if fields.hospitalized_or_surgery == Some(true) {
        if fields.hospitalization_details.trim().is_empty() {
            errors.insert(
                "hospitalization_details",
                "Please describe the hospitalization or surgery.",
            );
        }
        if fields.hospitalization_year.trim().is_empty() {
            errors.insert(
                "hospitalization_year",
                "Please enter the year of the hospitalization or surgery.",
            );
        }
    }

    // `None` means the "other" box is unchecked.
    for (field, other) in [
        ("past_history_other", &fields.past_history_other),
        ("family_history_other", &fields.family_history_other),
    ] {
        if other.as_deref().is_some_and(|text| text.trim().is_empty()) {
            errors.insert(field, "Please specify the other condition.");
        }
    }

    errors
}
