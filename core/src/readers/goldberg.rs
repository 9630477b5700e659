//! Reader for Goldberg-style JSON achievement files.
//!
//! The file is an array of loosely-shaped objects. Rather than walking
//! a dynamic object, each field is decoded through an explicit
//! fallback chain: the technical key comes from `name`, then `path`,
//! then the stringified object; unlock evidence is an `earned_time`
//! integer (seconds since epoch), possibly nested one object level
//! deep. Missing or mistyped fields mean "not unlocked", never an
//! error.

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde_json::Value;
use vigil_types::LocalUnlockRecord;

use crate::error::ReadError;

use super::SaveReader;

pub struct GoldbergReader;

impl SaveReader for GoldbergReader {
    fn name(&self) -> &'static str {
        "goldberg-json"
    }

    fn can_read(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("json")
        )
    }

    fn read(&self, path: &Path) -> Result<Vec<LocalUnlockRecord>, ReadError> {
        let bytes = fs::read(path).map_err(|e| ReadError::from_io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);

        let root: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "malformed json save");
                return Ok(Vec::new());
            }
        };
        let Some(items) = root.as_array() else {
            tracing::debug!(path = %path.display(), "json save is not an array");
            return Ok(Vec::new());
        };

        let records = items
            .iter()
            .filter_map(|item| {
                let key = technical_key(item)?;
                let earned = earned_time(item)?;
                if earned <= 0 {
                    return None;
                }
                Some(LocalUnlockRecord {
                    technical_key: key,
                    unlocked: true,
                    unlock_time: Utc.timestamp_opt(earned, 0).single(),
                    sort_index: None,
                })
            })
            .collect();
        Ok(records)
    }
}

/// `name` -> `path` -> stringified whole object.
fn technical_key(item: &Value) -> Option<String> {
    if let Some(name) = item.get("name").and_then(Value::as_str) {
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    if let Some(path) = item.get("path").and_then(Value::as_str) {
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }
    let fallback = item.to_string();
    (!fallback.is_empty()).then_some(fallback)
}

/// `earned_time` on the object itself, else on the first nested object
/// that carries one.
fn earned_time(item: &Value) -> Option<i64> {
    if let Some(v) = item.get("earned_time").and_then(Value::as_i64) {
        return Some(v);
    }
    item.as_object()?
        .values()
        .find_map(|v| v.get("earned_time").and_then(Value::as_i64))
}
