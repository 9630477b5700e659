//! Per-game merged achievement state: the unit of persistence and the
//! source of change notifications.
//!
//! Every game id owns an async-locked slot so that concurrent workers
//! on the same game cannot interleave their merge+diff+write sequence;
//! distinct games proceed in parallel. Blobs persist through the
//! injected [`StateStore`] under `cache_{game_id}`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tokio::sync::Mutex as AsyncMutex;
use vigil_types::{AchievementDefinition, LocalUnlockRecord, SchemaSet};

use crate::matcher;
use crate::signals::AchievementSignal;
use crate::store::StateStore;

/// Below this file size an empty read is believable (a save with no
/// unlocks yet); above it, an empty parse is almost certainly a
/// partial write and must not erase known-good state.
pub const DEFAULT_PARTIAL_GUARD_BYTES: u64 = 100;

fn cache_key(game_id: &str) -> String {
    format!("cache_{game_id}")
}

#[derive(Default)]
struct GameSlot {
    /// `None` = not yet loaded from the store.
    state: AsyncMutex<Option<Vec<AchievementDefinition>>>,
}

pub struct StateCache {
    store: Arc<dyn StateStore>,
    partial_guard_bytes: u64,
    slots: Mutex<HashMap<String, Arc<GameSlot>>>,
}

impl StateCache {
    pub fn new(store: Arc<dyn StateStore>, partial_guard_bytes: u64) -> Self {
        Self {
            store,
            partial_guard_bytes,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, game_id: &str) -> Arc<GameSlot> {
        let mut slots = self.slots.lock().unwrap();
        Arc::clone(slots.entry(game_id.to_string()).or_default())
    }

    fn load_from_store(&self, game_id: &str) -> Option<Vec<AchievementDefinition>> {
        let bytes = self.store.load(&cache_key(game_id))?;
        match serde_json::from_slice(&bytes) {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::warn!(game_id, error = %e, "discarding unreadable cache blob");
                None
            }
        }
    }

    fn persist(&self, game_id: &str, list: &[AchievementDefinition]) {
        match serde_json::to_vec(list) {
            Ok(bytes) => {
                if let Err(e) = self.store.store(&cache_key(game_id), &bytes) {
                    tracing::warn!(game_id, error = %e, "failed to persist achievement state");
                }
            }
            Err(e) => tracing::warn!(game_id, error = %e, "failed to serialize achievement state"),
        }
    }

    /// Last merged list for a game, memory first, then the store.
    pub async fn load(&self, game_id: &str) -> Option<Vec<AchievementDefinition>> {
        let slot = self.slot(game_id);
        let mut state = slot.state.lock().await;
        if state.is_none() {
            *state = self.load_from_store(game_id);
        }
        state.clone()
    }

    /// Install a freshly synced list (initial scan), replacing whatever
    /// was cached.
    pub async fn seed(&self, game_id: &str, list: Vec<AchievementDefinition>) {
        let slot = self.slot(game_id);
        let mut state = slot.state.lock().await;
        self.persist(game_id, &list);
        *state = Some(list);
    }

    /// Drop a game's cached and persisted state.
    pub async fn clear(&self, game_id: &str) {
        let slot = self.slot(game_id);
        let mut state = slot.state.lock().await;
        self.store.remove(&cache_key(game_id));
        *state = None;
    }

    /// Merge freshly read local records into the cached list and diff.
    ///
    /// Returns the transitions in list order: locked->unlocked as
    /// [`AchievementSignal::Unlocked`], any other unlocked-state change
    /// as [`AchievementSignal::StateChanged`]. The in-memory list is
    /// always replaced (a merge can refine timestamps or sort order
    /// without flipping any unlocked flag); persistence happens only
    /// when a transition fired.
    ///
    /// `file_len` feeds the partial-read guard: zero records out of a
    /// non-trivial file means a torn read, and the previous state stays
    /// authoritative.
    pub async fn apply_read(
        &self,
        game_id: &str,
        locals: &[LocalUnlockRecord],
        file_len: u64,
        schema: Option<&SchemaSet>,
        now: DateTime<Utc>,
    ) -> Vec<AchievementSignal> {
        if locals.is_empty() && file_len > self.partial_guard_bytes {
            tracing::warn!(
                game_id,
                file_len,
                "empty read from non-empty save file; keeping previous state"
            );
            return Vec::new();
        }

        let slot = self.slot(game_id);
        let mut state = slot.state.lock().await;
        if state.is_none() {
            *state = self.load_from_store(game_id);
        }
        let Some(cached) = state.as_ref().filter(|l| !l.is_empty()) else {
            // Never synced: there is no catalog list to merge into.
            tracing::debug!(game_id, "no cached achievement list, skipping update");
            return Vec::new();
        };

        // The cached list is the display list and, being index-aligned
        // with itself, also serves as the matching reference.
        let merged = matcher::merge(cached, cached, locals, schema, now);

        let previous: HashMap<String, bool> = cached
            .iter()
            .map(|a| (a.merge_key().to_string(), a.unlocked))
            .collect();

        let mut signals = Vec::new();
        for entry in &merged {
            let key = entry.merge_key();
            let Some(&was_unlocked) = previous.get(key) else {
                continue;
            };
            if entry.unlocked && !was_unlocked {
                signals.push(AchievementSignal::Unlocked {
                    game_id: game_id.to_string(),
                    technical_key: key.to_string(),
                    unlock_time: entry.unlock_time,
                });
            } else if entry.unlocked != was_unlocked {
                signals.push(AchievementSignal::StateChanged {
                    game_id: game_id.to_string(),
                    technical_key: key.to_string(),
                    unlocked: entry.unlocked,
                });
            }
        }

        if !signals.is_empty() {
            self.persist(game_id, &merged);
        }
        *state = Some(merged);
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::HashMap as StdHashMap;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000, 0).unwrap()
    }

    fn cache() -> StateCache {
        StateCache::new(Arc::new(MemoryStore::new()), DEFAULT_PARTIAL_GUARD_BYTES)
    }

    fn catalog(keys: &[&str], unlocked: usize) -> Vec<AchievementDefinition> {
        keys.iter()
            .enumerate()
            .map(|(i, key)| {
                let mut def = AchievementDefinition::new(format!("Achievement {key}"));
                def.technical_key = Some(key.to_string());
                if i < unlocked {
                    def.unlocked = true;
                    def.unlock_time = Some(now());
                }
                def
            })
            .collect()
    }

    fn schema_for(keys: &[&str]) -> SchemaSet {
        SchemaSet {
            names: keys
                .iter()
                .map(|k| (k.to_string(), format!("Achievement {k}")))
                .collect::<StdHashMap<_, _>>(),
            ordered_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn partial_read_guard_preserves_unlocked_state() {
        let cache = cache();
        let keys = ["ACH_A", "ACH_B", "ACH_C"];
        cache.seed("g1", catalog(&keys, 3)).await;

        // 3 unlocked cached, empty read from a 200-byte file: abort.
        let signals = cache
            .apply_read("g1", &[], 200, Some(&schema_for(&keys)), now())
            .await;
        assert!(signals.is_empty());

        let state = cache.load("g1").await.unwrap();
        assert_eq!(state.iter().filter(|a| a.unlocked).count(), 3);
    }

    #[tokio::test]
    async fn small_empty_file_is_a_believable_empty_save() {
        let cache = cache();
        let keys = ["ACH_A"];
        cache.seed("g1", catalog(&keys, 1)).await;

        let signals = cache
            .apply_read("g1", &[], 40, Some(&schema_for(&keys)), now())
            .await;
        // Guard does not trip; the unlock is silently withdrawn.
        assert_eq!(
            signals,
            vec![AchievementSignal::StateChanged {
                game_id: "g1".to_string(),
                technical_key: "ACH_A".to_string(),
                unlocked: false,
            }]
        );
    }

    #[tokio::test]
    async fn unlock_transition_emits_exactly_one_signal() {
        let cache = cache();
        let keys = ["ACH_A", "ACH_B"];
        cache.seed("g1", catalog(&keys, 0)).await;

        let unlock_time = Utc.timestamp_opt(1_700_000_000, 0).single();
        let locals = vec![LocalUnlockRecord::unlocked_at("ACH_A", unlock_time)];

        let signals = cache
            .apply_read("g1", &locals, 80, Some(&schema_for(&keys)), now())
            .await;
        assert_eq!(
            signals,
            vec![AchievementSignal::Unlocked {
                game_id: "g1".to_string(),
                technical_key: "ACH_A".to_string(),
                unlock_time,
            }]
        );

        // Same read again: no transitions, no signals.
        let again = cache
            .apply_read("g1", &locals, 80, Some(&schema_for(&keys)), now())
            .await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn timestamp_refinement_is_kept_without_signals() {
        let cache = cache();
        let keys = ["ACH_A"];
        // Seeded unlocked with the seed pass's clock standing in for a
        // missing timestamp.
        cache.seed("g1", catalog(&keys, 1)).await;

        // The save now carries the real unlock epoch.
        let real_time = Utc.timestamp_opt(1_700_000_000, 0).single();
        let locals = vec![LocalUnlockRecord::unlocked_at("ACH_A", real_time)];

        let signals = cache
            .apply_read("g1", &locals, 80, Some(&schema_for(&keys)), now())
            .await;
        // No unlocked-state transition, but the refined timestamp must
        // not be discarded.
        assert!(signals.is_empty());
        let state = cache.load("g1").await.unwrap();
        assert_eq!(state[0].unlock_time, real_time);
    }

    #[tokio::test]
    async fn unknown_game_is_skipped() {
        let cache = cache();
        let locals = vec![LocalUnlockRecord::unlocked_at("ACH_A", None)];
        let signals = cache.apply_read("never-synced", &locals, 80, None, now()).await;
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn state_survives_via_store() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let keys = ["ACH_A"];
        {
            let cache = StateCache::new(Arc::clone(&store), DEFAULT_PARTIAL_GUARD_BYTES);
            cache.seed("g1", catalog(&keys, 1)).await;
        }

        let cache = StateCache::new(store, DEFAULT_PARTIAL_GUARD_BYTES);
        let state = cache.load("g1").await.unwrap();
        assert!(state[0].unlocked);
    }

    #[tokio::test]
    async fn clear_drops_memory_and_store() {
        let cache = cache();
        cache.seed("g1", catalog(&["ACH_A"], 1)).await;
        cache.clear("g1").await;
        assert!(cache.load("g1").await.is_none());
    }
}
