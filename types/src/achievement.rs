//! Core achievement data model.
//!
//! `AchievementDefinition` is the catalog-sourced entry (one per
//! achievement in a game's list) and doubles as the merge output: the
//! matcher writes the resolved unlock state onto it, and the cache
//! persists the resulting list per game.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One achievement as supplied by the external catalog, carrying the
/// merged unlock state after a matcher pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    /// Stable language-independent identifier (e.g. `ACH_UNLOCK_DOOR`).
    /// Often absent in scraped data; the matcher resolves and fills it.
    #[serde(default)]
    pub technical_key: Option<String>,

    pub display_name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub image_ref: Option<String>,

    /// Global unlock percentage, 0.0..=100.0.
    #[serde(default)]
    pub rarity: f32,

    #[serde(default)]
    pub is_secret: bool,

    /// Presentation order. `None` means unordered and sorts last,
    /// stable by list position.
    #[serde(default)]
    pub sort_index: Option<u32>,

    #[serde(default)]
    pub unlocked: bool,

    #[serde(default)]
    pub unlock_time: Option<DateTime<Utc>>,
}

impl AchievementDefinition {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            technical_key: None,
            display_name: display_name.into(),
            description: String::new(),
            image_ref: None,
            rarity: 0.0,
            is_secret: false,
            sort_index: None,
            unlocked: false,
            unlock_time: None,
        }
    }

    /// The key used for state diffing: the resolved technical key when
    /// known, else the display name.
    pub fn merge_key(&self) -> &str {
        self.technical_key.as_deref().unwrap_or(&self.display_name)
    }
}

/// One unlock record read from a local save file.
///
/// Ephemeral: produced by a format reader and consumed by the matcher
/// within the same pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUnlockRecord {
    pub technical_key: String,
    pub unlocked: bool,
    pub unlock_time: Option<DateTime<Utc>>,
    pub sort_index: Option<u32>,
}

impl LocalUnlockRecord {
    pub fn unlocked_at(technical_key: impl Into<String>, unlock_time: Option<DateTime<Utc>>) -> Self {
        Self {
            technical_key: technical_key.into(),
            unlocked: true,
            unlock_time,
            sort_index: None,
        }
    }
}

/// An installed game as resolved by the host's game index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    /// Host-side game identity (opaque to this crate).
    pub id: String,
    pub name: String,
}
