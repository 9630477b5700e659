//! Byte-blob persistence behind the cache.
//!
//! The core only knows "load bytes by key / store bytes by key"; the
//! host decides where blobs live. A JSON-file-per-key store is provided
//! for standalone use, and an in-memory store for tests.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use hashbrown::HashMap;

pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    fn store(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
    fn remove(&self, key: &str);
}

/// One file per key under a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn store(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), bytes)
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    fn store(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.blobs.lock().unwrap().remove(key);
    }
}
