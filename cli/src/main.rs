use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil_core::config::TrackerConfig;
use vigil_core::pipeline::UpdatePipeline;
use vigil_core::readers::ReaderSet;
use vigil_core::resolver::GameIndex;
use vigil_core::signals::{AchievementSignal, SignalBus};
use vigil_core::store::JsonFileStore;
use vigil_core::watcher::SaveWatcher;
use vigil_types::GameRef;

#[derive(Parser)]
#[command(version, about = "Local achievement tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch configured save paths and report unlocks live
    Watch,
    /// Read a single save file and print its unlock records
    Scan {
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let config = TrackerConfig::load();

    match cli.command {
        Commands::Watch => watch(config).await,
        Commands::Scan { path } => scan(&config, &path),
        Commands::Config => {
            println!("data dir:      {}", config.data_dir().display());
            println!("watch paths:   {:?}", config.watch_paths);
            println!("debounce:      {}ms", config.debounce_ms);
            println!(
                "retry:         {} attempts, {}ms step",
                config.retry_attempts, config.retry_step_ms
            );
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn watch(config: TrackerConfig) {
    let data_dir = config.data_dir();
    let store = Arc::new(JsonFileStore::new(data_dir.clone()));
    let games = Arc::new(FileGameIndex::load(&data_dir));
    let bus = Arc::new(SignalBus::new());
    let pipeline = Arc::new(UpdatePipeline::new(&config, games, store, Arc::clone(&bus)));

    let mut watcher = SaveWatcher::new(Duration::from_millis(config.debounce_ms));
    let roots = watcher.start(&config.watch_paths);
    if roots == 0 {
        tracing::warn!("no watchable roots; add watch_paths to the config");
        return;
    }

    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            match signal {
                AchievementSignal::Unlocked {
                    game_id,
                    technical_key,
                    unlock_time,
                } => {
                    let when = unlock_time
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "just now".to_string());
                    println!("[{game_id}] UNLOCKED {technical_key} ({when})");
                }
                AchievementSignal::StateChanged {
                    game_id,
                    technical_key,
                    unlocked,
                } => {
                    println!("[{game_id}] {technical_key} -> unlocked={unlocked}");
                }
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
        _ = pipeline.run(watcher) => {}
    }
}

fn scan(config: &TrackerConfig, path: &PathBuf) {
    let readers = ReaderSet::with_defaults(config.epoch_threshold);
    match readers.read_file(path) {
        Ok(records) => {
            for record in &records {
                let when = record
                    .unlock_time
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let index = record
                    .sort_index
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<40} unlocked={} time={when} index={index}",
                    record.technical_key, record.unlocked
                );
            }
            println!("{} record(s)", records.len());
        }
        Err(e) => eprintln!("error: {e}"),
    }
}

/// Game index backed by a `games.json` file in the data directory:
/// a map of store app id to game id/name.
struct FileGameIndex {
    games: HashMap<String, GameRef>,
}

impl FileGameIndex {
    fn load(data_dir: &std::path::Path) -> Self {
        let path = data_dir.join("games.json");
        let games = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self { games }
    }
}

impl GameIndex for FileGameIndex {
    fn find_installed(&self, app_id: &str) -> Option<GameRef> {
        self.games.get(app_id).cloned()
    }
}
