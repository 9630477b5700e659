//! Three-way achievement reconciliation.
//!
//! Inputs are independently keyed: the reference-language catalog list
//! (matching source), the display-language list (merge target, same
//! order), local unlock records (technical keys), and the naming
//! schema (technical key <-> reference display name + canonical
//! order). The merge resolves one authoritative unlocked/locked state
//! per display entry.
//!
//! Pure and deterministic: identical inputs (including `now`, which
//! stands in for "unlocked but the save carried no timestamp") yield
//! identical output.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use vigil_types::{AchievementDefinition, LocalUnlockRecord, SchemaSet};

use crate::normalize::normalize_name;

/// Merge local unlock evidence into the display list.
///
/// Returns a new list, one entry per reference entry. When the display
/// list is shorter (scrape length drift), the reference entry stands in
/// index-by-index.
pub fn merge(
    reference: &[AchievementDefinition],
    display: &[AchievementDefinition],
    locals: &[LocalUnlockRecord],
    schema: Option<&SchemaSet>,
    now: DateTime<Utc>,
) -> Vec<AchievementDefinition> {
    // Local records by lowercased technical key; last write wins.
    let mut local_map: HashMap<String, &LocalUnlockRecord> = HashMap::new();
    for record in locals {
        let key = record.technical_key.trim();
        if !key.is_empty() {
            local_map.insert(key.to_ascii_lowercase(), record);
        }
    }

    // Schema reverse map: normalized reference name -> technical key.
    let mut name_to_key: HashMap<String, &str> = HashMap::new();
    // Schema canonical order: lowercased technical key -> position.
    let mut order_map: HashMap<String, u32> = HashMap::new();
    if let Some(schema) = schema {
        for (key, reference_name) in &schema.names {
            let norm = normalize_name(reference_name);
            if !norm.is_empty() {
                name_to_key.insert(norm, key.as_str());
            }
        }
        for (i, key) in schema.ordered_keys.iter().enumerate() {
            order_map.insert(key.to_ascii_lowercase(), i as u32);
        }
    }

    reference
        .iter()
        .enumerate()
        .map(|(i, reference_entry)| {
            let mut out = display.get(i).unwrap_or(reference_entry).clone();

            let norm_ref = normalize_name(&reference_entry.display_name);

            // Resolve the technical key: schema mapping, then the
            // catalog's own key, then the normalized name itself.
            let resolved_key: String = name_to_key
                .get(&norm_ref)
                .map(|k| (*k).to_string())
                .or_else(|| reference_entry.technical_key.clone())
                .unwrap_or_else(|| norm_ref.clone());

            let local = local_map
                .get(&resolved_key.to_ascii_lowercase())
                .or_else(|| local_map.get(&norm_ref))
                .copied();

            let mut sort_index = None;
            match local {
                Some(record) => {
                    out.unlocked = record.unlocked;
                    out.unlock_time = if record.unlocked {
                        // Unlocked with no resolvable timestamp: stamp
                        // with the pass's clock.
                        record.unlock_time.or(Some(now))
                    } else {
                        None
                    };
                    sort_index = record.sort_index;
                }
                None => {
                    // No local evidence: locked. The cache-level guard,
                    // not the matcher, protects against erroneous empty
                    // reads.
                    out.unlocked = false;
                    out.unlock_time = None;
                }
            }

            if sort_index.is_none() {
                sort_index = order_map.get(&resolved_key.to_ascii_lowercase()).copied();
            }
            out.sort_index = sort_index;
            out.technical_key = Some(resolved_key);
            out
        })
        .collect()
}
