//! File-backed category configuration.
//!
//! One YAML document per user category, named after the normalised category label:
//!
//! ```text
//! category_config/
//!   term.yaml              # the active term
//!   college.yaml
//!   incoming_freshman.yaml
//!   employee.yaml
//! ```
//!
//! Documents are maintained by administrators by hand, so parsing is lenient: a missing file
//! means "no configuration", and a malformed one is logged and treated the same way.

use crate::constants::{ACTIVE_TERM_FILENAME, YAML_EXTENSION};
use crate::error::{IntakeError, IntakeResult};
use crate::policy::CategoryConfig;
use crate::store::ConfigStore;
use async_trait::async_trait;
use intake_types::{normalize_key, TermId, UserCategory};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn category_path(&self, category: UserCategory) -> PathBuf {
        self.dir.join(format!(
            "{}.{YAML_EXTENSION}",
            normalize_key(category.as_str())
        ))
    }

    pub fn term_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_TERM_FILENAME)
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn category_config(
        &self,
        category: UserCategory,
    ) -> IntakeResult<Option<CategoryConfig>> {
        let path = self.category_path(category);
        let Some(value) = read_yaml_value(path.clone()).await? else {
            tracing::debug!(%category, "no category config file");
            return Ok(None);
        };

        let config = CategoryConfig::from_value(&value);
        if config.is_none() {
            tracing::warn!(path = %path.display(), "category config is not a map; ignoring");
        }
        Ok(config)
    }

    async fn active_term(&self) -> IntakeResult<Option<TermId>> {
        let path = self.term_path();
        let Some(value) = read_yaml_value(path.clone()).await? else {
            return Ok(None);
        };

        let term = term_from_value(&value);
        if term.is_none() {
            tracing::warn!(path = %path.display(), "active term file has no usable term");
        }
        Ok(term)
    }
}

/// Read and parse a YAML file off the async runtime. Missing and malformed files are `None`.
async fn read_yaml_value(path: PathBuf) -> IntakeResult<Option<Value>> {
    tokio::task::spawn_blocking(move || read_yaml_value_blocking(&path)).await?
}

fn read_yaml_value_blocking(path: &Path) -> IntakeResult<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IntakeError::FileRead(e)),
    };

    match serde_yaml::from_str::<Value>(&text) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "malformed YAML; using defaults");
            Ok(None)
        }
    }
}

/// Accepts a bare string, or a map with a `term`/`active_term`/`current_term` entry.
fn term_from_value(value: &Value) -> Option<TermId> {
    let text = match value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map.iter().find_map(|(key, value)| {
            matches!(
                normalize_key(key).as_str(),
                "term" | "active_term" | "current_term"
            )
            .then(|| value.as_str())
            .flatten()
        }),
        _ => None,
    }?;
    TermId::new(text).ok()
}
