//! Health-history rules: enumerated conditions, current medications, menstrual symptoms.

use super::FieldErrors;
use crate::conditions::condition_spec;
use crate::constants::MIN_CUSTOM_MEDICATION_TEXT_LEN;
use crate::record::{MedicationRow, ProfileFields};

pub(super) fn validate(fields: &ProfileFields) -> FieldErrors {
    let mut errors = FieldErrors::default();

    for (key, selection) in fields.selected_conditions() {
        let Some(spec) = condition_spec(key) else {
            tracing::debug!(condition = key, "ignoring selection of unknown condition");
            continue;
        };
        if spec.has_sub_options() && selection.sub_options.iter().all(|s| s.trim().is_empty()) {
            errors.insert(
                format!("conditions.{}.sub_options", spec.key),
                format!("Select at least one type of {}.", spec.label.to_lowercase()),
            );
        }
        if spec.requires_specification && selection.specification.trim().is_empty() {
            errors.insert(
                format!("conditions.{}.specification", spec.key),
                format!("Please specify your {}.", spec.label.to_lowercase()),
            );
        }
    }

    for (index, row) in fields.medications.iter().enumerate() {
        if !row.is_blank() {
            check_medication(index, row, &mut errors);
        }
    }

    if fields.has_other_menstrual_symptom() && fields.menstrual_symptoms_other.trim().is_empty() {
        errors.insert("menstrual_symptoms_other", "Please specify the other symptom.");
    }

    errors
}

fn check_medication(index: usize, row: &MedicationRow, errors: &mut FieldErrors) {
    let key = |field: &str| format!("medications[{index}].{field}");

    if row.drug.trim().is_empty() {
        errors.insert(key("drug"), "Select a drug.");
    } else if row.uses_custom_drug() && row.custom_drug.trim().is_empty() {
        errors.insert(key("custom_drug"), "Enter the drug name.");
    }

    let dose = row.dose.trim();
    if dose.is_empty() {
        errors.insert(key("dose"), "Enter a dose.");
    } else if !is_numeric_dose(dose) {
        errors.insert(key("dose"), "Dose must be a number.");
    }

    if row.unit.trim().is_empty() {
        errors.insert(key("unit"), "Select a unit.");
    }

    if row.frequency.trim().is_empty() {
        errors.insert(key("frequency"), "Select a frequency.");
    } else if row.uses_custom_frequency() && too_short(&row.custom_frequency) {
        errors.insert(
            key("custom_frequency"),
            format!("Frequency must be at least {MIN_CUSTOM_MEDICATION_TEXT_LEN} characters."),
        );
    }

    if row.duration.trim().is_empty() {
        errors.insert(key("duration"), "Select a duration.");
    } else if row.uses_custom_duration() && too_short(&row.custom_duration) {
        errors.insert(
            key("custom_duration"),
            format!("Duration must be at least {MIN_CUSTOM_MEDICATION_TEXT_LEN} characters."),
        );
    }
}

fn is_numeric_dose(text: &str) -> bool {
    text.parse::<f64>()
        .is_ok_and(|value| value.is_finite() && value >= 0.0)
}

fn too_short(text: &str) -> bool {
    text.trim().chars().count() < MIN_CUSTOM_MEDICATION_TEXT_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ConditionSelection;

    fn complete_row() -> MedicationRow {
        MedicationRow {
            drug: "Amoxicillin".into(),
            dose: "500".into(),
            unit: "mg".into(),
            frequency: "Every 8 hours".into(),
            duration: "7 days".into(),
            ..MedicationRow::default()
        }
    }

    fn select(fields: &mut ProfileFields, key: &str, selection: ConditionSelection) {
        fields.conditions.insert(
            key.into(),
            ConditionSelection {
                selected: true,
                ..selection
            },
        );
    }

    #[test]
    fn nothing_is_required_unconditionally() {
        assert!(validate(&ProfileFields::default()).is_empty());
    }

    #[test]
    fn blank_duration_flags_only_that_cell() {
        let fields = ProfileFields {
            medications: vec![MedicationRow {
                duration: String::new(),
                ..complete_row()
            }],
            ..ProfileFields::default()
        };
        let errors = validate(&fields);
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["medications[0].duration"]);
    }

    #[test]
    fn blank_rows_are_skipped_and_indices_preserved() {
        let fields = ProfileFields {
            medications: vec![
                MedicationRow::default(),
                MedicationRow {
                    dose: "two".into(),
                    ..complete_row()
                },
            ],
            ..ProfileFields::default()
        };
        let errors = validate(&fields);
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["medications[1].dose"]);
        assert_eq!(errors.get("medications[1].dose"), Some("Dose must be a number."));
    }

    #[test]
    fn custom_medication_values() {
        let fields = ProfileFields {
            medications: vec![MedicationRow {
                drug: "Other".into(),
                frequency: "specify".into(),
                custom_frequency: "qd".into(),
                duration: "specify".into(),
                custom_duration: "  2 months ".into(),
                ..complete_row()
            }],
            ..ProfileFields::default()
        };
        let errors = validate(&fields);
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            ["medications[0].custom_drug", "medications[0].custom_frequency"]
        );
    }

    #[test]
    fn doses_must_be_numbers() {
        assert!(is_numeric_dose("0.5"));
        assert!(is_numeric_dose("250"));
        assert!(is_numeric_dose("0"));
        assert!(!is_numeric_dose("-1"));
        assert!(!is_numeric_dose("NaN"));
        assert!(!is_numeric_dose("inf"));
        assert!(!is_numeric_dose("5 mg"));
    }

    #[test]
    fn selected_conditions_need_their_details() {
        let mut fields = ProfileFields::default();
        select(&mut fields, "diabetes", ConditionSelection::default());
        select(&mut fields, "Heart Disease", ConditionSelection::default());
        select(
            &mut fields,
            "allergy",
            ConditionSelection {
                sub_options: vec!["Food".into()],
                specification: "Shellfish".into(),
                ..ConditionSelection::default()
            },
        );
        fields.conditions.insert(
            "cancer".into(),
            ConditionSelection {
                selected: false,
                ..ConditionSelection::default()
            },
        );

        let errors = validate(&fields);
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            [
                "conditions.diabetes.sub_options",
                "conditions.heart_disease.specification"
            ]
        );
        assert_eq!(
            errors.get("conditions.heart_disease.specification"),
            Some("Please specify your heart disease.")
        );
    }

    #[test]
    fn other_menstrual_symptom_needs_text() {
        let mut fields = ProfileFields {
            menstrual_symptoms: vec!["Cramps".into(), "Others".into()],
            ..ProfileFields::default()
        };
        assert!(validate(&fields).contains("menstrual_symptoms_other"));

        fields.menstrual_symptoms_other = "Back pain".into();
        assert!(validate(&fields).is_empty());
    }
}
