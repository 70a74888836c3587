//! Per-user reference lists of previously typed free-text values.
//!
//! Whenever a patient types a value the form has no option for (a drug name, a nationality,
//! an "other" condition, the specification of a condition, a menstrual symptom), the value is
//! remembered in a slot so the next visit can offer it back as a one-click choice.
//!
//! Slots are append-only. Uniqueness is case-insensitive and the first spelling wins;
//! re-registering a known value never moves it.

use crate::record::ProfileFields;
use intake_types::normalize_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named bucket of remembered values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    DrugNames,
    Nationalities,
    OtherCondition,
    /// Specifications typed for one enumerated condition, keyed by condition.
    Specifications(String),
    MenstrualSymptoms,
}

impl Slot {
    /// Specification slot for a condition; the key is normalised so `"Allergic Rhinitis"` and
    /// `"allergic_rhinitis"` share a bucket.
    pub fn specifications(condition_key: &str) -> Self {
        Self::Specifications(normalize_key(condition_key))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DrugNames => f.write_str("drugNames"),
            Self::Nationalities => f.write_str("nationalities"),
            Self::OtherCondition => f.write_str("otherCondition"),
            Self::Specifications(key) => write!(f, "specifications[{key}]"),
            Self::MenstrualSymptoms => f.write_str("menstrualSymptoms"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomValueRegistry {
    drug_names: Vec<String>,
    nationalities: Vec<String>,
    other_condition: Vec<String>,
    specifications: BTreeMap<String, Vec<String>>,
    menstrual_symptoms: Vec<String>,
}

impl CustomValueRegistry {
    /// Remember `value` in `slot` and return the slot's list.
    ///
    /// Blank input and already-known values (in any casing) leave the list untouched.
    pub fn register(&mut self, slot: &Slot, value: &str) -> &[String] {
        let value = value.trim();
        if value.is_empty() {
            return self.values(slot);
        }

        let list = self.list_mut(slot);
        if !contains_ignore_case(list, value) {
            list.push(value.to_owned());
        }
        list
    }

    /// Remembered values of a slot, oldest first.
    pub fn values(&self, slot: &Slot) -> &[String] {
        match slot {
            Slot::DrugNames => &self.drug_names,
            Slot::Nationalities => &self.nationalities,
            Slot::OtherCondition => &self.other_condition,
            Slot::MenstrualSymptoms => &self.menstrual_symptoms,
            Slot::Specifications(key) => self
                .specifications
                .get(&normalize_key(key))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    pub fn is_known(&self, slot: &Slot, value: &str) -> bool {
        contains_ignore_case(self.values(slot), value.trim())
    }

    /// Total number of remembered values across all slots.
    pub fn len(&self) -> usize {
        self.drug_names.len()
            + self.nationalities.len()
            + self.other_condition.len()
            + self.menstrual_symptoms.len()
            + self.specifications.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Condition keys that have at least one remembered specification.
    pub fn specification_keys(&self) -> impl Iterator<Item = &str> {
        self.specifications.keys().map(String::as_str)
    }

    /// Register every free-text value currently populated in `fields` and tied to an active
    /// selection. Returns how many values were new.
    ///
    /// Runs at save time only; values typed and then abandoned before saving are never
    /// remembered.
    pub fn harvest(&mut self, fields: &ProfileFields) -> usize {
        let before = self.len();

        if fields.has_foreign_nationality() {
            self.register(&Slot::Nationalities, &fields.nationality_specify);
        }

        for row in fields.medications.iter().filter(|row| !row.is_blank()) {
            if row.uses_custom_drug() {
                self.register(&Slot::DrugNames, &row.custom_drug);
            }
        }

        for (key, selection) in fields.selected_conditions() {
            self.register(&Slot::specifications(key), &selection.specification);
        }

        if fields.has_other_menstrual_symptom() {
            self.register(&Slot::MenstrualSymptoms, &fields.menstrual_symptoms_other);
        }

        for other in [&fields.past_history_other, &fields.family_history_other]
            .into_iter()
            .flatten()
        {
            self.register(&Slot::OtherCondition, other);
        }

        let added = self.len() - before;
        if added > 0 {
            tracing::debug!(added, "registered custom values");
        }
        added
    }

    fn list_mut(&mut self, slot: &Slot) -> &mut Vec<String> {
        match slot {
            Slot::DrugNames => &mut self.drug_names,
            Slot::Nationalities => &mut self.nationalities,
            Slot::OtherCondition => &mut self.other_condition,
            Slot::MenstrualSymptoms => &mut self.menstrual_symptoms,
            Slot::Specifications(key) => self
                .specifications
                .entry(normalize_key(key))
                .or_default(),
        }
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    let needle = value.to_lowercase();
    list.iter().any(|known| known.to_lowercase() == needle)
}
