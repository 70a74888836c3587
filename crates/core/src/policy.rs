//! Field policy resolution.
//!
//! Decides, per field and step, whether the field is shown and whether it is required, by
//! merging the admin-controlled [`CategoryConfig`] for the user's category with the built-in
//! [`StaticDefaults`].
//!
//! Category configurations are edited by administrators and arrive in loosely defined
//! shapes. [`CategoryConfig::from_value`] accepts the known spellings and ignores anything
//! else, so a malformed configuration degrades to the static defaults instead of failing.
//! All field-name comparisons go through [`intake_types::normalize_key`].

use crate::steps::Step;
use intake_types::normalize_key;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Resolved requirement for one field in one rendering context. Derived, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldPolicy {
    pub field_name: String,
    pub visible: bool,
    pub required: bool,
    /// `None` means unconstrained; the caller supplies its own enumeration.
    pub allowed_options: Option<Vec<String>>,
}

/// Category-specific option lists an admin can configure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSlot {
    Course,
    Department,
    YearLevel,
    Strand,
    PositionType,
}

impl OptionSlot {
    pub const ALL: [OptionSlot; 5] = [
        OptionSlot::Course,
        OptionSlot::Department,
        OptionSlot::YearLevel,
        OptionSlot::Strand,
        OptionSlot::PositionType,
    ];

    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Department => "department",
            Self::YearLevel => "year_level",
            Self::Strand => "strand",
            Self::PositionType => "position_type",
        }
    }

    const fn plural(self) -> &'static str {
        match self {
            Self::Course => "courses",
            Self::Department => "departments",
            Self::YearLevel => "year_levels",
            Self::Strand => "strands",
            Self::PositionType => "position_types",
        }
    }

    /// The slot backing a form field, if the field is category-specific.
    pub fn for_field(field_name: &str) -> Option<Self> {
        let key = normalize_key(field_name);
        Self::ALL
            .into_iter()
            .find(|slot| slot.field_name() == key || slot.plural() == key)
    }
}

/// Admin-controlled configuration for one user category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryConfig {
    pub category: Option<String>,
    /// Normalised names of fields the category requires.
    pub required_fields: BTreeSet<String>,
    /// Normalised names of fields the category hides (unless also required).
    pub hidden_fields: BTreeSet<String>,
    pub options: BTreeMap<OptionSlot, Vec<String>>,
}

impl CategoryConfig {
    /// Leniently read a configuration document.
    ///
    /// Accepted keys (in any casing or separator style): `category`/`name`,
    /// `required_fields`/`required`, `hidden_fields`/`hidden`, an `options` map keyed by
    /// slot, and top-level slot lists such as `courses` or `year_levels`. Entries of the wrong
    /// type are skipped. Returns `None` when the document is not a map at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut config = CategoryConfig::default();

        for (key, value) in object {
            match normalize_key(key).as_str() {
                "category" | "name" => {
                    config.category = value.as_str().map(|s| s.trim().to_owned());
                }
                "required_fields" | "required" => {
                    config.required_fields = string_list(value)
                        .iter()
                        .map(|f| normalize_key(f))
                        .collect();
                }
                "hidden_fields" | "hidden" => {
                    config.hidden_fields = string_list(value)
                        .iter()
                        .map(|f| normalize_key(f))
                        .collect();
                }
                "options" => {
                    if let Some(map) = value.as_object() {
                        for (slot_key, list) in map {
                            if let Some(slot) = OptionSlot::for_field(slot_key) {
                                config.options.insert(slot, string_list(list));
                            }
                        }
                    }
                }
                other => {
                    if let Some(slot) = OptionSlot::for_field(other) {
                        if value.is_array() {
                            config.options.insert(slot, string_list(value));
                        }
                    }
                }
            }
        }

        Some(config)
    }

    pub fn requires(&self, field_name: &str) -> bool {
        self.required_fields.contains(&normalize_key(field_name))
    }

    pub fn hides(&self, field_name: &str) -> bool {
        self.hidden_fields.contains(&normalize_key(field_name))
    }

    pub fn options_for(&self, slot: OptionSlot) -> Option<&[String]> {
        self.options.get(&slot).map(Vec::as_slice)
    }
}

/// Built-in required fields per step, used whenever the category configuration is silent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticDefaults(BTreeMap<Step, BTreeSet<String>>);

impl StaticDefaults {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// The intake form's defaults: core identity and contact fields on step 1, nothing
    /// unconditional elsewhere.
    pub fn builtin() -> Self {
        Self::empty().with(
            Step::Identity,
            &[
                "first_name",
                "last_name",
                "sex",
                "date_of_birth",
                "email",
                "contact_number",
                "address",
                "nationality",
            ],
        )
    }

    pub fn with(mut self, step: Step, fields: &[&str]) -> Self {
        self.0
            .entry(step)
            .or_default()
            .extend(fields.iter().map(|f| normalize_key(f)));
        self
    }

    pub fn requires(&self, step: Step, field_name: &str) -> bool {
        self.0
            .get(&step)
            .is_some_and(|fields| fields.contains(&normalize_key(field_name)))
    }
}

impl Default for StaticDefaults {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Resolve the policy of one field.
///
/// A field the category configuration requires is required and visible whatever the
/// defaults say. Otherwise the static defaults for `step` decide. Pure; never fails.
pub fn resolve(
    config: Option<&CategoryConfig>,
    field_name: &str,
    step: Step,
    defaults: &StaticDefaults,
) -> FieldPolicy {
    let required =
        config.is_some_and(|c| c.requires(field_name)) || defaults.requires(step, field_name);
    let visible = required || !config.is_some_and(|c| c.hides(field_name));
    let allowed_options = OptionSlot::for_field(field_name)
        .and_then(|slot| config.and_then(|c| c.options_for(slot)))
        .map(<[String]>::to_vec);

    FieldPolicy {
        field_name: normalize_key(field_name),
        visible,
        required,
        allowed_options,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
