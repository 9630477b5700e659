pub mod achievement;
pub mod schema;

pub use achievement::{AchievementDefinition, GameRef, LocalUnlockRecord};
pub use schema::SchemaSet;
