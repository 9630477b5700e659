//! The per-event worker: retry-wrapped read -> game resolution ->
//! merge -> diff -> persist -> notify, fully sequential within one
//! task. Nothing here may escape as a panic or error; every failure
//! path degrades to skip or keep-previous.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vigil_types::{AchievementDefinition, GameRef};

use crate::cache::StateCache;
use crate::config::TrackerConfig;
use crate::matcher;
use crate::readers::{self, ReaderSet};
use crate::resolver::{self, GameIndex};
use crate::schema::SchemaCache;
use crate::signals::SignalBus;
use crate::store::StateStore;
use crate::watcher::SaveWatcher;

pub struct UpdatePipeline {
    readers: ReaderSet,
    games: Arc<dyn GameIndex>,
    cache: StateCache,
    schemas: SchemaCache,
    bus: Arc<SignalBus>,
    search_paths: Vec<String>,
    retry_attempts: u32,
    retry_step: Duration,
}

impl UpdatePipeline {
    pub fn new(
        config: &TrackerConfig,
        games: Arc<dyn GameIndex>,
        store: Arc<dyn StateStore>,
        bus: Arc<SignalBus>,
    ) -> Self {
        Self {
            readers: ReaderSet::with_defaults(config.epoch_threshold),
            games,
            cache: StateCache::new(Arc::clone(&store), config.partial_guard_bytes),
            schemas: SchemaCache::new(store),
            bus,
            search_paths: config.watch_paths.clone(),
            retry_attempts: config.retry_attempts.max(1),
            retry_step: Duration::from_millis(config.retry_step_ms),
        }
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// Drive the watcher: one spawned worker per qualifying event.
    /// Returns when the watcher is stopped.
    pub async fn run(self: Arc<Self>, mut watcher: SaveWatcher) {
        while let Some(path) = watcher.next_event().await {
            let pipeline = Arc::clone(&self);
            tokio::spawn(async move {
                pipeline.process_with_retry(&path).await;
            });
        }
    }

    /// Process one changed file, retrying while a writer holds the
    /// lock. Each attempt is preceded by a growing delay to give the
    /// game time to finish writing.
    pub async fn process_with_retry(&self, path: &Path) {
        for attempt in 1..=self.retry_attempts {
            tokio::time::sleep(self.retry_step * attempt).await;

            match self.process_file(path).await {
                Ok(()) => return,
                Err(e) if e.is_transient() => {
                    if attempt == self.retry_attempts {
                        tracing::warn!(
                            path = %path.display(),
                            attempts = self.retry_attempts,
                            "file still locked, dropping event"
                        );
                    }
                }
                Err(e) => {
                    // Programming or data error, not transient: no retry.
                    tracing::error!(path = %path.display(), error = %e, "failed to process save file");
                    return;
                }
            }
        }
    }

    async fn process_file(&self, path: &Path) -> Result<(), crate::error::ReadError> {
        let Some(app_id) = resolver::extract_app_id(path) else {
            tracing::debug!(path = %path.display(), "no app id in path, skipping");
            return Ok(());
        };
        let Some(game) = self.games.find_installed(&app_id) else {
            // Not an error: uninstalled or unrelated file.
            tracing::debug!(app_id, "no installed game for app id, skipping");
            return Ok(());
        };

        // Length first: the partial-read guard needs the size of the
        // file the records came from, and a vanished file must abort
        // rather than pass a zero length that defeats the guard.
        let file_len = fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| crate::error::ReadError::from_io(path, e))?;
        let records = self.readers.read_file(path)?;
        let schema = self.schemas.get(&app_id);

        let signals = self
            .cache
            .apply_read(&game.id, &records, file_len, schema.as_deref(), Utc::now())
            .await;

        if !signals.is_empty() {
            tracing::info!(
                game = %game.name,
                changes = signals.len(),
                "achievement state changed"
            );
            self.bus.emit_all(signals);
        }
        Ok(())
    }

    /// Initial full scan for a game: merge catalog lists with whatever
    /// the save file currently says and seed the cache. Returns
    /// (unlocked, total).
    pub async fn sync_game(
        &self,
        game: &GameRef,
        app_id: &str,
        reference: Vec<AchievementDefinition>,
        display: Vec<AchievementDefinition>,
    ) -> (usize, usize) {
        // A display list scraped at a different length cannot be
        // index-aligned; fall back to the reference language wholesale.
        let display = if display.len() == reference.len() {
            display
        } else {
            reference.clone()
        };

        let roots: Vec<PathBuf> = self
            .search_paths
            .iter()
            .map(|raw| readers::resolve_template(raw, app_id))
            .collect();

        let records = match self.readers.find_save_file(app_id, &roots) {
            Some(path) => self.readers.read_file(&path).unwrap_or_default(),
            None => Vec::new(),
        };

        let schema = self.schemas.get(app_id);
        let merged = matcher::merge(
            &reference,
            &display,
            &records,
            schema.as_deref(),
            Utc::now(),
        );

        let unlocked = merged.iter().filter(|a| a.unlocked).count();
        let total = merged.len();
        self.cache.seed(&game.id, merged).await;
        tracing::info!(game = %game.name, unlocked, total, "synced achievement list");
        (unlocked, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::readers::SaveReader;
    use crate::signals::AchievementSignal;
    use crate::store::MemoryStore;
    use std::collections::HashMap as StdHashMap;
    use std::io;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vigil_types::{LocalUnlockRecord, SchemaSet};

    /// Index answering only the app ids it was built with. Tests derive
    /// the expected id from the real path, since any ancestor directory
    /// (tempdirs included) may contribute the first digit run.
    struct MapIndex(StdHashMap<String, GameRef>);

    impl GameIndex for MapIndex {
        fn find_installed(&self, app_id: &str) -> Option<GameRef> {
            self.0.get(app_id).cloned()
        }
    }

    fn game() -> GameRef {
        GameRef {
            id: "game-480".to_string(),
            name: "Test Game".to_string(),
        }
    }

    fn index_for(path: &Path) -> Arc<MapIndex> {
        let app_id = resolver::extract_app_id(path).unwrap();
        Arc::new(MapIndex(StdHashMap::from([(app_id, game())])))
    }

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            retry_step_ms: 1,
            ..TrackerConfig::default()
        }
    }

    fn pipeline_with(games: Arc<dyn GameIndex>) -> (Arc<UpdatePipeline>, Arc<SignalBus>) {
        let bus = Arc::new(SignalBus::new());
        let pipeline = Arc::new(UpdatePipeline::new(
            &test_config(),
            games,
            Arc::new(MemoryStore::new()),
            Arc::clone(&bus),
        ));
        (pipeline, bus)
    }

    fn catalog() -> Vec<AchievementDefinition> {
        let mut door = AchievementDefinition::new("Open the Door");
        door.technical_key = Some("ACH_UNLOCK_DOOR".to_string());
        vec![door]
    }

    #[tokio::test]
    async fn end_to_end_unlock_emits_signal() {
        let dir = tempfile::tempdir().unwrap();
        let save_dir = dir.path().join("480");
        fs::create_dir_all(&save_dir).unwrap();
        let path = save_dir.join("achievements.ini");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "[ACH_UNLOCK_DOOR]").unwrap();
        writeln!(f, "achieved=1").unwrap();
        drop(f);

        let (pipeline, bus) = pipeline_with(index_for(&path));
        let mut rx = bus.subscribe();
        pipeline.cache.seed("game-480", catalog()).await;

        pipeline.process_with_retry(&path).await;

        let signal = rx.try_recv().unwrap();
        assert!(matches!(
            signal,
            AchievementSignal::Unlocked { ref technical_key, ref game_id, .. }
                if technical_key == "ACH_UNLOCK_DOOR" && game_id == "game-480"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unresolvable_game_is_silently_skipped() {
        struct NoGames;
        impl GameIndex for NoGames {
            fn find_installed(&self, _app_id: &str) -> Option<GameRef> {
                None
            }
        }

        let (pipeline, bus) = pipeline_with(Arc::new(NoGames));
        let mut rx = bus.subscribe();

        let dir = tempfile::tempdir().unwrap();
        let save_dir = dir.path().join("999");
        fs::create_dir_all(&save_dir).unwrap();
        let path = save_dir.join("achievements.ini");
        fs::write(&path, "[ACH_A]\nachieved=1\n").unwrap();

        pipeline.process_with_retry(&path).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn vanished_file_aborts_without_touching_state() {
        let dir = tempfile::tempdir().unwrap();
        let save_dir = dir.path().join("480");
        fs::create_dir_all(&save_dir).unwrap();
        // Resolvable game, but the file is already gone by read time.
        let path = save_dir.join("achievements.ini");

        let (pipeline, bus) = pipeline_with(index_for(&path));
        let mut rx = bus.subscribe();
        let mut seeded = catalog();
        seeded[0].unlocked = true;
        pipeline.cache.seed("game-480", seeded).await;

        pipeline.process_with_retry(&path).await;

        // No signals, and the unlocked state was not re-locked.
        assert!(rx.try_recv().is_err());
        let state = pipeline.cache.load("game-480").await.unwrap();
        assert!(state[0].unlocked);
    }

    /// Reader that reports a lock for the first N reads.
    struct FlakyReader {
        fail_count: AtomicU32,
        records: Vec<LocalUnlockRecord>,
    }

    impl SaveReader for FlakyReader {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn can_read(&self, path: &Path) -> bool {
            matches!(path.extension().and_then(|e| e.to_str()), Some("ini"))
        }

        fn read(&self, path: &Path) -> Result<Vec<LocalUnlockRecord>, ReadError> {
            if self.fail_count.load(Ordering::SeqCst) > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                return Err(ReadError::from_io(
                    path,
                    io::Error::new(io::ErrorKind::WouldBlock, "locked by writer"),
                ));
            }
            Ok(self.records.clone())
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_two_locked_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("480.ini");
        fs::write(&path, "[ACH_UNLOCK_DOOR]\nachieved=1\n").unwrap();

        let bus = Arc::new(SignalBus::new());
        let mut pipeline = UpdatePipeline::new(
            &test_config(),
            index_for(&path),
            Arc::new(MemoryStore::new()),
            Arc::clone(&bus),
        );
        pipeline.readers = ReaderSet::new(vec![Box::new(FlakyReader {
            fail_count: AtomicU32::new(2),
            records: vec![LocalUnlockRecord::unlocked_at("ACH_UNLOCK_DOOR", None)],
        })]);
        let pipeline = Arc::new(pipeline);
        let mut rx = bus.subscribe();

        pipeline.cache.seed("game-480", catalog()).await;

        pipeline.process_with_retry(&path).await;

        // Two locked attempts, success on the third: no dropped event.
        assert!(matches!(
            rx.try_recv().unwrap(),
            AchievementSignal::Unlocked { .. }
        ));
    }

    #[tokio::test]
    async fn schema_feeds_the_merge() {
        let (pipeline, _bus) = pipeline_with(Arc::new(MapIndex(StdHashMap::from([(
            "480".to_string(),
            game(),
        )]))));
        pipeline.schemas.put(
            "480",
            SchemaSet {
                names: StdHashMap::from([(
                    "ACH_UNLOCK_DOOR".to_string(),
                    "Open the Door".to_string(),
                )]),
                ordered_keys: vec!["ACH_UNLOCK_DOOR".to_string()],
            },
        );

        // Catalog with no technical keys: only the schema can resolve them.
        let reference = vec![AchievementDefinition::new("Open the Door")];
        pipeline
            .sync_game(&game(), "480", reference.clone(), reference)
            .await;

        let cached = pipeline.cache.load("game-480").await.unwrap();
        assert_eq!(cached[0].technical_key.as_deref(), Some("ACH_UNLOCK_DOOR"));
        assert_eq!(cached[0].sort_index, Some(0));
    }
}
