//! Reader for sectioned key-value save files (`.ini`/`.txt`).
//!
//! Layout: `[Section]` headers with `key=value` lines and `;`/`#`
//! comments. A section named `SteamAchievements` or `Achievements`
//! (case-insensitive) is the index: `00001=ACH_NAME` lines giving the
//! presentation order, not unlock records. Every other non-reserved
//! section is a candidate achievement keyed by its section name.
//!
//! Unlock evidence is `achieved=1|true` or a positive
//! `unlocktime`/`time`/`timestamp` value. Values above the epoch
//! plausibility threshold are real Unix timestamps; smaller positive
//! values mean "unlocked, time unknown" (some emulators write a bare
//! flag into the time field).

use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use hashbrown::HashMap;
use vigil_types::LocalUnlockRecord;

use crate::error::ReadError;

use super::SaveReader;

/// Default boundary between "bare flag" and "real Unix epoch" values.
/// Inherited from field observation (mid-2020 epoch); configurable
/// because the exact boundary is unverifiable.
pub const DEFAULT_EPOCH_THRESHOLD: i64 = 1_600_000_000;

const RESERVED_SECTIONS: [&str; 5] =
    ["steamachievements", "achievements", "stats", "settings", "language"];

pub struct SectionedReader {
    epoch_threshold: i64,
}

impl SectionedReader {
    pub fn new(epoch_threshold: i64) -> Self {
        Self { epoch_threshold }
    }
}

impl Default for SectionedReader {
    fn default() -> Self {
        Self::new(DEFAULT_EPOCH_THRESHOLD)
    }
}

impl SaveReader for SectionedReader {
    fn name(&self) -> &'static str {
        "sectioned-ini"
    }

    fn can_read(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("ini") || ext.eq_ignore_ascii_case("txt")
        )
    }

    fn read(&self, path: &Path) -> Result<Vec<LocalUnlockRecord>, ReadError> {
        let bytes = fs::read(path).map_err(|e| ReadError::from_io(path, e))?;
        // Game writers are not reliable about encodings; decode lossily.
        let (text, _, _) = encoding_rs::UTF_8.decode(&bytes);
        Ok(self.parse(&text))
    }
}

fn is_index_section(section: &str) -> bool {
    section.eq_ignore_ascii_case("steamachievements") || section.eq_ignore_ascii_case("achievements")
}

fn is_reserved_section(section: &str) -> bool {
    RESERVED_SECTIONS
        .iter()
        .any(|r| section.eq_ignore_ascii_case(r))
}

impl SectionedReader {
    fn parse(&self, text: &str) -> Vec<LocalUnlockRecord> {
        // Records in file order; by_key lets a repeated section overwrite
        // its earlier occurrence without disturbing that order.
        let mut records: Vec<LocalUnlockRecord> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        // technical key (lowercased) -> presentation index
        let mut index_map: HashMap<String, u32> = HashMap::new();

        let mut section = String::new();
        let mut achieved = false;
        let mut unlock_value: i64 = 0;

        let flush = |section: &str, achieved: bool, unlock_value: i64,
                         records: &mut Vec<LocalUnlockRecord>,
                         by_key: &mut HashMap<String, usize>| {
            if section.is_empty() || is_reserved_section(section) {
                return;
            }
            let unlocked = achieved || unlock_value > 0;
            if !unlocked {
                return;
            }
            let record = LocalUnlockRecord {
                technical_key: section.to_string(),
                unlocked: true,
                unlock_time: self.epoch_to_time(unlock_value),
                sort_index: None,
            };
            match by_key.get(&section.to_ascii_lowercase()) {
                Some(&pos) => records[pos] = record,
                None => {
                    by_key.insert(section.to_ascii_lowercase(), records.len());
                    records.push(record);
                }
            }
        };

        for line in text.lines() {
            let clean = line.trim();
            if clean.is_empty() || clean.starts_with(';') || clean.starts_with('#') {
                continue;
            }

            if let Some(header) = clean.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                flush(&section, achieved, unlock_value, &mut records, &mut by_key);
                section = header.to_string();
                achieved = false;
                unlock_value = 0;
                continue;
            }

            if section.is_empty() {
                continue;
            }
            let Some((key, value)) = clean.split_once('=') else {
                // Not key=value; ignore the line, keep the section.
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            if is_index_section(&section) {
                // 00001=ACH_NAME lines; non-numeric keys (Count etc.) are skipped.
                if let Ok(idx) = key.parse::<u32>() {
                    index_map.insert(value.to_ascii_lowercase(), idx);
                }
                continue;
            }

            if key.eq_ignore_ascii_case("achieved") {
                achieved = value == "1" || value.eq_ignore_ascii_case("true");
            } else if key.eq_ignore_ascii_case("unlocktime")
                || key.eq_ignore_ascii_case("time")
                || key.eq_ignore_ascii_case("timestamp")
            {
                if let Ok(v) = value.parse::<i64>() {
                    unlock_value = v;
                } else {
                    tracing::debug!(key, value, "non-numeric time field, ignoring");
                }
            }
        }
        flush(&section, achieved, unlock_value, &mut records, &mut by_key);

        // Back-fill indices from the index section, then order by them.
        for record in &mut records {
            record.sort_index = index_map
                .get(&record.technical_key.to_ascii_lowercase())
                .copied();
        }
        records.sort_by_key(|r| r.sort_index.unwrap_or(u32::MAX));
        records
    }

    fn epoch_to_time(&self, value: i64) -> Option<DateTime<Utc>> {
        if value > self.epoch_threshold {
            Utc.timestamp_opt(value, 0).single()
        } else {
            None
        }
    }
}
