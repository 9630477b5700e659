//! Per-app schema caching.
//!
//! The naming schema is scraped elsewhere and handed in already
//! parsed; this layer only remembers it, memory first and then the
//! byte store under `schema_{app_id}`. An absent schema is a normal
//! condition and the matcher degrades to direct name matching.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use vigil_types::SchemaSet;

use crate::store::StateStore;

fn schema_key(app_id: &str) -> String {
    format!("schema_{app_id}")
}

pub struct SchemaCache {
    store: Arc<dyn StateStore>,
    memory: Mutex<HashMap<String, Arc<SchemaSet>>>,
}

impl SchemaCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, app_id: &str) -> Option<Arc<SchemaSet>> {
        if let Some(schema) = self.memory.lock().unwrap().get(app_id) {
            return Some(Arc::clone(schema));
        }

        let bytes = self.store.load(&schema_key(app_id))?;
        match serde_json::from_slice::<SchemaSet>(&bytes) {
            Ok(schema) if !schema.is_empty() => {
                let schema = Arc::new(schema);
                self.memory
                    .lock()
                    .unwrap()
                    .insert(app_id.to_string(), Arc::clone(&schema));
                Some(schema)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(app_id, error = %e, "discarding unreadable schema blob");
                None
            }
        }
    }

    /// Store a freshly supplied schema for an app id.
    pub fn put(&self, app_id: &str, schema: SchemaSet) {
        match serde_json::to_vec(&schema) {
            Ok(bytes) => {
                if let Err(e) = self.store.store(&schema_key(app_id), &bytes) {
                    tracing::warn!(app_id, error = %e, "failed to persist schema");
                }
            }
            Err(e) => tracing::warn!(app_id, error = %e, "failed to serialize schema"),
        }
        self.memory
            .lock()
            .unwrap()
            .insert(app_id.to_string(), Arc::new(schema));
    }
}
