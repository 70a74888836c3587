//! Update-in-place versus new-version decisions, and the version-chain invariant.
//!
//! Saving a draft for a term that already has a record needs an explicit choice from the
//! user: overwrite the live record, or fork a new version that points back at it. The
//! decision is pure; [`prepare`] turns it into the record and [`SaveMode`] the store expects.

use crate::error::{IntakeError, IntakeResult};
use crate::record::{Draft, ProfileRecord};
use crate::store::SaveMode;
use intake_types::RecordId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What the user asked for when saving over an existing record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionChoice {
    Update,
    Fork,
    /// No choice made yet.
    #[default]
    Ask,
}

impl FromStr for VersionChoice {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "fork" | "version" | "new_version" => Ok(Self::Fork),
            "ask" => Ok(Self::Ask),
            other => Err(IntakeError::InvalidInput(format!(
                "unknown version choice '{other}' (expected update, fork or ask)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveAction {
    /// No record exists for the term; create version 1.
    CreateNew,
    /// A record exists and the user has not chosen; nothing may be saved yet.
    AskUser,
    UpdateInPlace(RecordId),
    CreateVersion {
        version: u32,
        previous_version_id: RecordId,
    },
}

/// The version that follows `version` in a lineage.
pub fn next_version(version: u32) -> IntakeResult<u32> {
    version.checked_add(1).ok_or_else(|| {
        IntakeError::BrokenLineage(format!("version {version} has no successor"))
    })
}

/// Decide how to save against the live record of the term.
///
/// Without a persisted live record the choice is irrelevant and the result is always
/// [`SaveAction::CreateNew`]. Fails only when the live version cannot be incremented.
pub fn decide(existing: Option<&ProfileRecord>, choice: VersionChoice) -> IntakeResult<SaveAction> {
    let Some((id, version)) = existing.and_then(|r| r.id.map(|id| (id, r.version.unwrap_or(1))))
    else {
        return Ok(SaveAction::CreateNew);
    };

    let action = match choice {
        VersionChoice::Ask => SaveAction::AskUser,
        VersionChoice::Update => SaveAction::UpdateInPlace(id),
        VersionChoice::Fork => SaveAction::CreateVersion {
            version: next_version(version)?,
            previous_version_id: id,
        },
    };
    tracing::debug!(?choice, ?action, "version decision");
    Ok(action)
}

/// Build the record to hand to the store for `action`.
///
/// Returns `None` for [`SaveAction::AskUser`]. The draft and the live record are left
/// untouched; forks get a fresh id.
pub fn prepare(
    action: SaveAction,
    draft: &Draft,
    live: Option<&ProfileRecord>,
) -> Option<(ProfileRecord, SaveMode)> {
    let mut record = draft.record.clone();
    record.saved_at = None;

    let mode = match action {
        SaveAction::AskUser => return None,
        SaveAction::CreateNew => {
            record.id = Some(RecordId::new());
            record.version = Some(1);
            record.previous_version_id = None;
            SaveMode::Create
        }
        SaveAction::UpdateInPlace(id) => {
            record.id = Some(id);
            record.version = live.and_then(|r| r.version).or(Some(1));
            record.previous_version_id = live.and_then(|r| r.previous_version_id);
            SaveMode::Update
        }
        SaveAction::CreateVersion {
            version,
            previous_version_id,
        } => {
            record.id = Some(RecordId::new());
            record.version = Some(version);
            record.previous_version_id = Some(previous_version_id);
            SaveMode::CreateVersion
        }
    };
    Some((record, mode))
}

/// Check a lineage, oldest first: versions start at 1 and step by one, and each record
/// points back at its predecessor.
pub fn verify_lineage(lineage: &[ProfileRecord]) -> IntakeResult<()> {
    let mut previous: Option<(RecordId, u32)> = None;

    for record in lineage {
        let id = record
            .id
            .ok_or_else(|| IntakeError::BrokenLineage("record without an id".into()))?;
        let version = record
            .version
            .ok_or_else(|| IntakeError::BrokenLineage(format!("record {id} has no version")))?;

        match previous {
            None => {
                if version != 1 || record.previous_version_id.is_some() {
                    return Err(IntakeError::BrokenLineage(format!(
                        "first record {id} is version {version} with a back-reference of {:?}",
                        record.previous_version_id.map(|p| p.to_string())
                    )));
                }
            }
            Some((prev_id, prev_version)) => {
                if record.previous_version_id != Some(prev_id) {
                    return Err(IntakeError::BrokenLineage(format!(
                        "record {id} does not point back at {prev_id}"
                    )));
                }
                let expected = next_version(prev_version)?;
                if version != expected {
                    return Err(IntakeError::BrokenLineage(format!(
                        "record {id} is version {version}, expected {expected}"
                    )));
                }
            }
        }
        previous = Some((id, version));
    }
    Ok(())
}
