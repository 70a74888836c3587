//! Validated primitive types shared across the intake workspace.
//!
//! Every type here guarantees its invariant once constructed, so the engine can pass them
//! around without re-checking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated primitive types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input spans more than one line
    #[error("Text must be a single line")]
    Multiline,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid record id: {0}")]
    InvalidRecordId(String),
    #[error("unknown user category: {0}")]
    UnknownCategory(String),
}

/// Normalise a field, slot or category name to `lowercase_snake_case`.
///
/// `"Year Level"`, `"year-level"`, `"yearLevel"` and `"YEAR_LEVEL"` all become `"year_level"`.
/// This is the only name normalisation in the workspace; every comparison of admin-supplied
/// names goes through it.
pub fn normalize_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev: Option<char> = None;

    for ch in input.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else if ch.is_uppercase() {
            if matches!(prev, Some(p) if p.is_lowercase() || p.is_ascii_digit())
                && !out.ends_with('_')
            {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText`, rejecting blank input.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a `NonEmptyText` that must also fit on one line.
    pub fn single_line(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.contains(['\n', '\r']) {
            return Err(TextError::Multiline);
        }
        Ok(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(value: NonEmptyText) -> Self {
        value.0
    }
}

/// A structurally valid email address (`local@domain.tld`).
///
/// This is the identity-level check used for commit authors and the identity source. Form
/// input goes through the stricter pattern in the step validator instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        let invalid = || TextError::InvalidEmail(trimmed.to_owned());

        let (local, domain) = trimmed.split_once('@').ok_or_else(invalid)?;
        if local.is_empty()
            || domain.contains('@')
            || trimmed.chars().any(char::is_whitespace)
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return Err(invalid());
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// Identifier of a patient as issued by the health service (student or employee number).
///
/// Restricted to `[A-Za-z0-9._-]` and at most 64 characters, since it is used as a storage
/// directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientId(String);

impl PatientId {
    const MAX_LEN: usize = 64;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TextError::InvalidIdentifier(format!(
                "patient id exceeds maximum length of {} characters",
                Self::MAX_LEN
            )));
        }

        let ok = trimmed
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));
        if !ok || trimmed.starts_with('.') {
            return Err(TextError::InvalidIdentifier(format!(
                "patient id contains invalid characters: '{trimmed}'"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PatientId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PatientId {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PatientId> for String {
    fn from(value: PatientId) -> Self {
        value.0
    }
}

/// Academic term (school year + semester) a profile version is scoped to, e.g.
/// `"2024-2025 1st Semester"`.
///
/// Terms are opaque to the engine: only equality matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TermId(NonEmptyText);

impl TermId {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::single_line(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TermId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TermId {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TermId> for String {
    fn from(value: TermId) -> Self {
        value.0.into()
    }
}

/// Identifier of one stored profile record (one version).
///
/// Canonical form is 32 lowercase hex characters without hyphens, the same value as
/// `Uuid::new_v4().simple().to_string()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Allocates a fresh record id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parses a canonical record id. Hyphenated or uppercase forms are rejected.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let canonical = input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !canonical {
            return Err(TextError::InvalidRecordId(format!(
                "expected 32 lowercase hex characters, got '{input}'"
            )));
        }
        uuid::Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| TextError::InvalidRecordId(e.to_string()))
    }

    pub fn uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(value: RecordId) -> Self {
        value.to_string()
    }
}

/// The user categories the health service configures separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UserCategory {
    Employee,
    College,
    IncomingFreshman,
    SeniorHigh,
    JuniorHigh,
    Elementary,
}

impl UserCategory {
    pub const ALL: [UserCategory; 6] = [
        UserCategory::Employee,
        UserCategory::College,
        UserCategory::IncomingFreshman,
        UserCategory::SeniorHigh,
        UserCategory::JuniorHigh,
        UserCategory::Elementary,
    ];

    /// Parses a category label in any casing or separator style.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        match normalize_key(input).as_str() {
            "employee" | "staff" | "faculty" => Ok(Self::Employee),
            "college" | "collegiate" => Ok(Self::College),
            "incoming_freshman" | "freshman" => Ok(Self::IncomingFreshman),
            "senior_high" | "senior_high_school" | "shs" => Ok(Self::SeniorHigh),
            "junior_high" | "junior_high_school" | "jhs" => Ok(Self::JuniorHigh),
            "elementary" | "grade_school" => Ok(Self::Elementary),
            _ => Err(TextError::UnknownCategory(input.trim().to_owned())),
        }
    }

    /// Canonical label, also the key under which category configuration is stored.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::College => "College",
            Self::IncomingFreshman => "Incoming Freshman",
            Self::SeniorHigh => "Senior High",
            Self::JuniorHigh => "Junior High",
            Self::Elementary => "Elementary",
        }
    }

    pub const fn is_collegiate(self) -> bool {
        matches!(self, Self::College | Self::IncomingFreshman)
    }

    pub const fn is_secondary(self) -> bool {
        matches!(self, Self::SeniorHigh | Self::JuniorHigh)
    }

    pub const fn is_senior_secondary(self) -> bool {
        matches!(self, Self::SeniorHigh)
    }
}

impl fmt::Display for UserCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserCategory {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserCategory {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserCategory> for String {
    fn from(value: UserCategory) -> Self {
        value.as_str().to_owned()
    }
}
