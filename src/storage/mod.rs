//! Persistence of the user record and of in-flight flow states.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// Key/value persistence for serialized records.
///
/// Writes to one key replace the previous record wholesale; concurrent writers never
/// interleave, the last one wins.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, record: String) -> Result<()>;
    /// Removes the record and returns it, so that a record can be taken exactly once.
    async fn remove(&self, key: &str) -> Result<Option<String>>;
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
