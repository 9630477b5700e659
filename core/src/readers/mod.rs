//! Pluggable local save-file readers.
//!
//! Each reader understands one on-disk layout and turns a file into
//! unlock records. Parse problems inside a readable file never abort
//! the whole file; they are skipped per record. I/O failures surface
//! as [`ReadError`] so the watcher's retry loop can classify them.

pub mod goldberg;
pub mod sectioned;

use std::fs;
use std::path::{Path, PathBuf};

use vigil_types::LocalUnlockRecord;

use crate::error::ReadError;

pub use goldberg::GoldbergReader;
pub use sectioned::SectionedReader;

pub trait SaveReader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap filename-level check, no I/O.
    fn can_read(&self, path: &Path) -> bool;

    /// Read one file into unlock records. Returns `Ok(vec![])` on any
    /// content-level parse failure; `Err` only for I/O problems.
    fn read(&self, path: &Path) -> Result<Vec<LocalUnlockRecord>, ReadError>;
}

/// Ordered set of registered readers; first accepting reader wins.
pub struct ReaderSet {
    readers: Vec<Box<dyn SaveReader>>,
}

impl ReaderSet {
    pub fn new(readers: Vec<Box<dyn SaveReader>>) -> Self {
        Self { readers }
    }

    /// The stock configuration: sectioned ini/txt plus Goldberg json.
    pub fn with_defaults(epoch_threshold: i64) -> Self {
        Self::new(vec![
            Box::new(SectionedReader::new(epoch_threshold)),
            Box::new(GoldbergReader),
        ])
    }

    pub fn can_read(&self, path: &Path) -> bool {
        self.readers.iter().any(|r| r.can_read(path))
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<LocalUnlockRecord>, ReadError> {
        for reader in &self.readers {
            if reader.can_read(path) {
                let records = reader.read(path)?;
                tracing::debug!(
                    reader = reader.name(),
                    path = %path.display(),
                    count = records.len(),
                    "read save file"
                );
                return Ok(records);
            }
        }
        Err(ReadError::Unsupported {
            path: path.to_path_buf(),
        })
    }

    /// Locate the save file for a game: walk the search roots and pick
    /// the first readable file whose path mentions the app id.
    pub fn find_save_file(&self, app_id: &str, search_roots: &[PathBuf]) -> Option<PathBuf> {
        if app_id.is_empty() {
            return None;
        }
        for root in search_roots {
            if !root.is_dir() {
                continue;
            }
            let root_mentions_id = path_contains(root, app_id);
            let mut found = None;
            walk_files(root, &mut |file| {
                if found.is_some() {
                    return;
                }
                if (root_mentions_id || path_contains(file, app_id)) && self.can_read(file) {
                    found = Some(file.to_path_buf());
                }
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Substitute the `{AppId}` placeholder in a configured search path.
/// Environment-variable expansion is the host's concern.
pub fn resolve_template(raw: &str, app_id: &str) -> PathBuf {
    PathBuf::from(raw.replace("{AppId}", app_id))
}

fn path_contains(path: &Path, needle: &str) -> bool {
    path.to_string_lossy().contains(needle)
}

fn walk_files(dir: &Path, visit: &mut impl FnMut(&Path)) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, visit);
        } else {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn first_accepting_reader_wins() {
        let set = ReaderSet::with_defaults(1_600_000_000);
        assert!(set.can_read(Path::new("saves/480/achievements.ini")));
        assert!(set.can_read(Path::new("saves/480/achievements.json")));
        assert!(!set.can_read(Path::new("saves/480/achievements.dat")));
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let set = ReaderSet::with_defaults(1_600_000_000);
        let err = set.read_file(Path::new("save.dat")).unwrap_err();
        assert!(matches!(err, ReadError::Unsupported { .. }));
    }

    #[test]
    fn finds_save_file_by_app_id_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let game_dir = dir.path().join("12345").join("stats");
        fs::create_dir_all(&game_dir).unwrap();
        let mut f = fs::File::create(game_dir.join("achievements.ini")).unwrap();
        writeln!(f, "[ACH_ONE]").unwrap();
        writeln!(f, "achieved=1").unwrap();

        let set = ReaderSet::with_defaults(1_600_000_000);
        let found = set.find_save_file("12345", &[dir.path().to_path_buf()]);
        assert!(found.is_some());
        assert!(found.unwrap().ends_with("achievements.ini"));

        assert!(set.find_save_file("99999", &[dir.path().to_path_buf()]).is_none());
    }

    #[test]
    fn template_substitutes_app_id() {
        let p = resolve_template("/saves/{AppId}/stats", "480");
        assert_eq!(p, PathBuf::from("/saves/480/stats"));
    }
}
