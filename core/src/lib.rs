pub mod cache;
pub mod config;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod readers;
pub mod resolver;
pub mod schema;
pub mod signals;
pub mod store;
pub mod watcher;

// Re-exports for convenience
pub use cache::StateCache;
pub use config::TrackerConfig;
pub use error::ReadError;
pub use pipeline::UpdatePipeline;
pub use signals::{AchievementSignal, SignalBus};
pub use watcher::SaveWatcher;
