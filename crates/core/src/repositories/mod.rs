//! File-backed implementations of the store traits.
//!
//! - [`profiles::FileProfileStore`]: profile records as YAML, one git repository per patient
//! - [`config::FileConfigStore`]: per-category configuration and the active term as YAML

pub mod config;
pub mod profiles;

pub use config::FileConfigStore;
pub use profiles::FileProfileStore;
