//! The four wizard steps and which fields each one owns.
//!
//! Every error the validator reports is keyed by a field owned by exactly one step. Keys are
//! either plain field names (`nationality_specify`) or paths into the repeated sections
//! (`medications[0].duration`, `conditions.hepatitis.sub_options`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Identity,
    HealthHistory,
    MedicalHistory,
    Review,
}

/// Fields owned by the identity and contact step.
pub const IDENTITY_FIELDS: &[&str] = &[
    "first_name",
    "middle_name",
    "last_name",
    "suffix",
    "sex",
    "date_of_birth",
    "email",
    "contact_number",
    "address",
    "nationality",
    "nationality_specify",
    "photo",
    "employee_id",
    "department",
    "position_type",
    "course",
    "year_level",
    "strand",
    "emergency_contact_name",
    "emergency_contact_number",
];

/// Plain fields owned by the health-history step; conditions and medications are owned by
/// prefix.
pub const HEALTH_HISTORY_FIELDS: &[&str] = &["menstrual_symptoms", "menstrual_symptoms_other"];

/// Fields owned by the medical and family history step.
pub const MEDICAL_HISTORY_FIELDS: &[&str] = &[
    "hospitalized_or_surgery",
    "hospitalization_details",
    "hospitalization_year",
    "past_history",
    "past_history_other",
    "family_history",
    "family_history_other",
];

impl Step {
    pub const ALL: [Step; 4] = [
        Step::Identity,
        Step::HealthHistory,
        Step::MedicalHistory,
        Step::Review,
    ];

    /// Steps that carry their own validation rules.
    pub const EDITABLE: [Step; 3] = [Step::Identity, Step::HealthHistory, Step::MedicalHistory];

    /// 1-based position shown to the user.
    pub const fn number(self) -> u8 {
        match self {
            Self::Identity => 1,
            Self::HealthHistory => 2,
            Self::MedicalHistory => 3,
            Self::Review => 4,
        }
    }

    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Identity),
            2 => Some(Self::HealthHistory),
            3 => Some(Self::MedicalHistory),
            4 => Some(Self::Review),
            _ => None,
        }
    }

    pub const fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub const fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Identity => "Personal information",
            Self::HealthHistory => "Health history",
            Self::MedicalHistory => "Medical and family history",
            Self::Review => "Review",
        }
    }

    /// True when an error keyed by `field` belongs to this step.
    pub fn owns(self, field: &str) -> bool {
        match self {
            Self::Identity => IDENTITY_FIELDS.contains(&field),
            Self::HealthHistory => {
                HEALTH_HISTORY_FIELDS.contains(&field)
                    || field == "conditions"
                    || field == "medications"
                    || field.starts_with("conditions.")
                    || field.starts_with("medications[")
            }
            Self::MedicalHistory => MEDICAL_HISTORY_FIELDS.contains(&field),
            Self::Review => false,
        }
    }

    /// The step that owns `field`, if any.
    pub fn owner_of(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.owns(field))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.title())
    }
}
