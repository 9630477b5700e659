//! Naming schema: the external mapping between technical keys and
//! reference-language display names, plus canonical presentation order.
//!
//! Sourced per app id from storefront metadata by a collaborator and
//! cached as a JSON blob. May legitimately be empty; consumers degrade
//! to direct name matching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSet {
    /// technical key -> reference-language display name.
    #[serde(default)]
    pub names: HashMap<String, String>,

    /// Technical keys in canonical presentation order.
    #[serde(default)]
    pub ordered_keys: Vec<String>,
}

impl SchemaSet {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Canonical position of a technical key, case-insensitive.
    pub fn order_of(&self, technical_key: &str) -> Option<u32> {
        self.ordered_keys
            .iter()
            .position(|k| k.eq_ignore_ascii_case(technical_key))
            .map(|i| i as u32)
    }
}
