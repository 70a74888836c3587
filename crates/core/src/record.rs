//! Profile records, drafts and the typed field bag.
//!
//! A [`ProfileRecord`] is one stored version of a patient's intake data for one academic term.
//! A [`Draft`] is the in-memory working copy the orchestrator hands to the engine; it owns a
//! record that has no id (and no version) until its first save.
//!
//! [`ProfileFields`] lists the keys the engine inspects. Everything else a client sends is
//! kept verbatim in [`ProfileFields::extra`] so that saving a record never drops data the
//! engine does not know about.

use crate::registry::CustomValueRegistry;
use chrono::{DateTime, Utc};
use intake_types::{normalize_key, PatientId, RecordId, TermId, UserCategory};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Drug choice meaning "not in the list; see `custom_drug`".
pub const OTHER_DRUG: &str = "Other";

/// Frequency/duration choice meaning "see the matching custom field".
pub const SPECIFY_CHOICE: &str = "specify";

/// Menstrual-symptom choice that enables the free-text field.
pub const OTHER_MENSTRUAL_SYMPTOM: &str = "Others";

/// Selection state of one enumerated health condition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionSelection {
    pub selected: bool,
    pub sub_options: Vec<String>,
    pub specification: String,
}

/// One row of the current-medication table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationRow {
    pub drug: String,
    pub custom_drug: String,
    pub dose: String,
    pub unit: String,
    pub frequency: String,
    pub custom_frequency: String,
    pub duration: String,
    pub custom_duration: String,
}

impl MedicationRow {
    /// True when nothing has been typed or chosen in the row.
    pub fn is_blank(&self) -> bool {
        [
            &self.drug,
            &self.custom_drug,
            &self.dose,
            &self.unit,
            &self.frequency,
            &self.custom_frequency,
            &self.duration,
            &self.custom_duration,
        ]
        .iter()
        .all(|v| v.trim().is_empty())
    }

    pub fn uses_custom_drug(&self) -> bool {
        self.drug.trim().eq_ignore_ascii_case(OTHER_DRUG)
    }

    pub fn uses_custom_frequency(&self) -> bool {
        self.frequency.trim().eq_ignore_ascii_case(SPECIFY_CHOICE)
    }

    pub fn uses_custom_duration(&self) -> bool {
        self.duration.trim().eq_ignore_ascii_case(SPECIFY_CHOICE)
    }
}

/// Reads a stored category label; a label no longer recognised becomes `None` so the rest of
/// the record stays readable and the user is asked to pick a category again.
fn lenient_category<'de, D>(deserializer: D) -> Result<Option<UserCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.and_then(|label| match UserCategory::parse(&label) {
        Ok(category) => Some(category),
        Err(err) => {
            tracing::warn!(error = %err, "dropping unrecognised user category");
            None
        }
    }))
}

/// The intake form's field bag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFields {
    // Identity and contact (step 1).
    #[serde(deserialize_with = "lenient_category")]
    pub user_category: Option<UserCategory>,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub suffix: String,
    pub sex: String,
    pub date_of_birth: String,
    pub email: String,
    pub contact_number: String,
    pub address: String,
    pub nationality: String,
    pub nationality_specify: String,
    pub photo_url: Option<String>,
    pub employee_id: String,
    pub department: String,
    pub position_type: String,
    pub course: String,
    pub year_level: String,
    pub strand: String,
    pub emergency_contact_name: String,
    pub emergency_contact_number: String,

    // Health history (step 2).
    pub conditions: BTreeMap<String, ConditionSelection>,
    pub medications: Vec<MedicationRow>,
    pub menstrual_symptoms: Vec<String>,
    pub menstrual_symptoms_other: String,

    // Medical and family history (step 3).
    pub hospitalized_or_surgery: Option<bool>,
    pub hospitalization_details: String,
    pub hospitalization_year: String,
    pub past_history: BTreeSet<String>,
    /// `None` while the "other" box is unchecked; `Some` (possibly blank) once touched.
    pub past_history_other: Option<String>,
    pub family_history: BTreeSet<String>,
    pub family_history_other: Option<String>,

    /// Keys the engine does not inspect, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProfileFields {
    /// Text value of a single-value field, looked up by (normalised) field name.
    ///
    /// Unknown names fall through to the passthrough bucket, where only string values count.
    pub fn text(&self, name: &str) -> Option<&str> {
        let key = normalize_key(name);
        let value = match key.as_str() {
            "first_name" => &self.first_name,
            "middle_name" => &self.middle_name,
            "last_name" => &self.last_name,
            "suffix" => &self.suffix,
            "sex" => &self.sex,
            "date_of_birth" => &self.date_of_birth,
            "email" => &self.email,
            "contact_number" => &self.contact_number,
            "address" => &self.address,
            "nationality" => &self.nationality,
            "nationality_specify" => &self.nationality_specify,
            "employee_id" => &self.employee_id,
            "department" => &self.department,
            "position_type" => &self.position_type,
            "course" => &self.course,
            "year_level" => &self.year_level,
            "strand" => &self.strand,
            "emergency_contact_name" => &self.emergency_contact_name,
            "emergency_contact_number" => &self.emergency_contact_number,
            "hospitalization_details" => &self.hospitalization_details,
            "hospitalization_year" => &self.hospitalization_year,
            "menstrual_symptoms_other" => &self.menstrual_symptoms_other,
            "photo_url" => return self.photo_url.as_deref(),
            "user_category" => return self.user_category.map(UserCategory::as_str),
            _ => return self.extra.get(&key).and_then(serde_json::Value::as_str),
        };
        Some(value.as_str())
    }

    /// True when the field has a non-blank text value.
    pub fn is_filled(&self, name: &str) -> bool {
        self.text(name).is_some_and(|v| !v.trim().is_empty())
    }

    /// True when the nationality choice is the "foreign / other" option.
    pub fn has_foreign_nationality(&self) -> bool {
        matches!(
            normalize_key(&self.nationality).as_str(),
            "foreigner" | "foreign" | "other" | "others"
        )
    }

    pub fn has_persisted_photo(&self) -> bool {
        self.photo_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Conditions whose checkbox is currently ticked, by key.
    pub fn selected_conditions(&self) -> impl Iterator<Item = (&str, &ConditionSelection)> {
        self.conditions
            .iter()
            .filter(|(_, selection)| selection.selected)
            .map(|(key, selection)| (key.as_str(), selection))
    }

    pub fn has_other_menstrual_symptom(&self) -> bool {
        self.menstrual_symptoms
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(OTHER_MENSTRUAL_SYMPTOM))
    }
}

/// One version of a patient's intake data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub patient_id: PatientId,
    pub term_id: TermId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<RecordId>,
    #[serde(default)]
    pub fields: ProfileFields,
    #[serde(default)]
    pub custom_registry: CustomValueRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// An unsaved, empty record for the given patient and term.
    pub fn blank(patient_id: PatientId, term_id: TermId) -> Self {
        Self {
            id: None,
            patient_id,
            term_id,
            version: None,
            previous_version_id: None,
            fields: ProfileFields::default(),
            custom_registry: CustomValueRegistry::default(),
            saved_at: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// The in-progress working copy of a profile, owned by one intake session.
#[derive(Clone, Debug, PartialEq)]
pub struct Draft {
    pub record: ProfileRecord,
    /// A new photo has been attached through the upload collaborator but not yet persisted.
    pub photo_attached: bool,
}

impl Draft {
    pub fn new(record: ProfileRecord) -> Self {
        Self {
            record,
            photo_attached: false,
        }
    }

    pub fn fields(&self) -> &ProfileFields {
        &self.record.fields
    }

    pub fn fields_mut(&mut self) -> &mut ProfileFields {
        &mut self.record.fields
    }

    /// A photo exists for this profile, stored or freshly attached.
    pub fn has_photo(&self) -> bool {
        self.photo_attached || self.record.fields.has_persisted_photo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_survive_a_yaml_round_trip() {
        let yaml = r#"
first_name: Ana
blood_type: O+
guardian:
  name: Rosa
  relation: mother
"#;
        let fields: ProfileFields = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fields.first_name, "Ana");
        assert_eq!(fields.extra.len(), 2);
        assert_eq!(fields.text("blood_type"), Some("O+"));
        assert_eq!(fields.text("guardian"), None);

        let rendered = serde_yaml::to_string(&fields).unwrap();
        let reparsed: ProfileFields = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.extra, fields.extra);
    }

    #[test]
    fn unrecognised_category_does_not_fail_the_record() {
        let fields: ProfileFields =
            serde_yaml::from_str("user_category: Alumni\nfirst_name: Ana\n").unwrap();
        assert_eq!(fields.user_category, None);
        assert_eq!(fields.first_name, "Ana");

        let fields: ProfileFields =
            serde_yaml::from_str("user_category: senior high school\n").unwrap();
        assert_eq!(fields.user_category, Some(UserCategory::SeniorHigh));

        let fields: ProfileFields = serde_yaml::from_str("user_category: ~\n").unwrap();
        assert_eq!(fields.user_category, None);
    }

    #[test]
    fn text_lookup_normalises_names() {
        let fields = ProfileFields {
            contact_number: "09171234567".into(),
            ..ProfileFields::default()
        };
        assert_eq!(fields.text("Contact Number"), Some("09171234567"));
        assert_eq!(fields.text("contactNumber"), Some("09171234567"));
        assert!(fields.is_filled("contact_number"));
        assert!(!fields.is_filled("address"));
    }

    #[test]
    fn medication_row_blankness_ignores_whitespace() {
        let row = MedicationRow {
            dose: "  ".into(),
            ..MedicationRow::default()
        };
        assert!(row.is_blank());

        let row = MedicationRow {
            drug: "other".into(),
            frequency: "Specify".into(),
            ..MedicationRow::default()
        };
        assert!(!row.is_blank());
        assert!(row.uses_custom_drug());
        assert!(row.uses_custom_frequency());
        assert!(!row.uses_custom_duration());
    }

    #[test]
    fn foreign_nationality_detection() {
        let mut fields = ProfileFields {
            nationality: "Foreigner".into(),
            ..ProfileFields::default()
        };
        assert!(fields.has_foreign_nationality());
        fields.nationality = "Filipino".into();
        assert!(!fields.has_foreign_nationality());
    }

    #[test]
    fn draft_photo_sources() {
        let record = ProfileRecord::blank(
            PatientId::parse("2021-0001").unwrap(),
            TermId::new("2024-2025 1st Semester").unwrap(),
        );
        let mut draft = Draft::new(record);
        assert!(!draft.has_photo());
        draft.photo_attached = true;
        assert!(draft.has_photo());
        draft.photo_attached = false;
        draft.fields_mut().photo_url = Some("photos/2021-0001.jpg".into());
        assert!(draft.has_photo());
    }
}
