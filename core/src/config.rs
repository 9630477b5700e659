//! Tracker configuration, loaded via confy (TOML).
//!
//! Every timing/threshold constant of the pipeline lives here so hosts
//! can tune them; the defaults are the observed-good values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Raw watch/search paths. `{AppId}` placeholders are allowed;
    /// non-existing tails are climbed to the nearest existing ancestor
    /// when watching.
    pub watch_paths: Vec<String>,

    /// Duplicate-event suppression window per path.
    pub debounce_ms: u64,

    /// Read attempts per filesystem event.
    pub retry_attempts: u32,

    /// Base delay before attempt n is `retry_step_ms * n`.
    pub retry_step_ms: u64,

    /// Numeric save values above this are treated as real Unix
    /// timestamps rather than bare unlock flags.
    pub epoch_threshold: i64,

    /// Empty reads from files larger than this abort the update.
    pub partial_guard_bytes: u64,

    /// Override for the per-game state blob directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            debounce_ms: 1_000,
            retry_attempts: 3,
            retry_step_ms: 200,
            epoch_threshold: crate::readers::sectioned::DEFAULT_EPOCH_THRESHOLD,
            partial_guard_bytes: crate::cache::DEFAULT_PARTIAL_GUARD_BYTES,
            data_dir: None,
        }
    }
}

impl TrackerConfig {
    pub fn load() -> Self {
        confy::load("vigil", None).unwrap_or_default()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vigil")
        })
    }
}
