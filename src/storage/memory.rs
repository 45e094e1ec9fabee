use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Store;
use crate::error::Result;

/// Records kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn save(&self, key: &str, record: String) -> Result<()> {
        self.records.write().insert(key.to_string(), record);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records.write().remove(key))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .records
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
