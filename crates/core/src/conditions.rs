//! Catalogue of the enumerated health conditions on the health-history step.
//!
//! The catalogue is closed: it is the form's fixed checklist, not something admins extend.
//! Each entry declares whether ticking it requires choosing sub-options, typing a
//! specification, or both.

use intake_types::normalize_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub sub_options: &'static [&'static str],
    pub requires_specification: bool,
}

impl ConditionSpec {
    pub fn has_sub_options(&self) -> bool {
        !self.sub_options.is_empty()
    }
}

pub const CONDITIONS: &[ConditionSpec] = &[
    ConditionSpec {
        key: "allergy",
        label: "Allergy",
        sub_options: &["Food", "Drug", "Insect bite", "Environmental"],
        requires_specification: true,
    },
    ConditionSpec {
        key: "allergic_rhinitis",
        label: "Allergic rhinitis",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "asthma",
        label: "Asthma",
        sub_options: &[],
        requires_specification: false,
    },
    ConditionSpec {
        key: "diabetes",
        label: "Diabetes mellitus",
        sub_options: &["Type 1", "Type 2", "Gestational"],
        requires_specification: false,
    },
    ConditionSpec {
        key: "hypertension",
        label: "Hypertension",
        sub_options: &[],
        requires_specification: false,
    },
    ConditionSpec {
        key: "hyperthyroidism",
        label: "Hyperthyroidism",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "hypothyroidism",
        label: "Hypothyroidism",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "hepatitis",
        label: "Hepatitis",
        sub_options: &["Hepatitis A", "Hepatitis B", "Hepatitis C"],
        requires_specification: false,
    },
    ConditionSpec {
        key: "heart_disease",
        label: "Heart disease",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "kidney_disease",
        label: "Kidney disease",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "mental_health",
        label: "Mental health condition",
        sub_options: &["Anxiety", "Depression", "Bipolar disorder", "ADHD", "Other"],
        requires_specification: false,
    },
    ConditionSpec {
        key: "seizure_disorder",
        label: "Seizure disorder",
        sub_options: &[],
        requires_specification: false,
    },
    ConditionSpec {
        key: "skin_problems",
        label: "Skin problems",
        sub_options: &["Acne", "Eczema", "Psoriasis", "Fungal infection"],
        requires_specification: false,
    },
    ConditionSpec {
        key: "cancer",
        label: "Cancer",
        sub_options: &[],
        requires_specification: true,
    },
    ConditionSpec {
        key: "tuberculosis",
        label: "Tuberculosis",
        sub_options: &[],
        requires_specification: false,
    },
];

/// Look up a condition by key, in any casing or separator style.
pub fn condition_spec(key: &str) -> Option<&'static ConditionSpec> {
    let key = normalize_key(key);
    CONDITIONS.iter().find(|spec| spec.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique_and_normalised() {
        let mut seen = HashSet::new();
        for spec in CONDITIONS {
            assert_eq!(spec.key, normalize_key(spec.key));
            assert!(seen.insert(spec.key), "duplicate key {}", spec.key);
        }
    }

    #[test]
    fn lookup_is_lenient() {
        assert_eq!(
            condition_spec("Allergic Rhinitis").map(|c| c.key),
            Some("allergic_rhinitis")
        );
        assert!(condition_spec("hepatitis").unwrap().has_sub_options());
        assert!(condition_spec("gout").is_none());
    }
}
