use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::sync::Mutex;
use tracing::{event, Level};

use super::Store;
use crate::error::Result;

const EXTENSION: &str = "json";

/// One file per key inside a directory, surviving restarts of the host.
///
/// Key names are base64url encoded into file names since namespaces carry URLs.
/// Records are written to a temporary file and renamed into place.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write: Mutex<()>,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = URL_SAFE_NO_PAD.encode(key.as_bytes());
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    fn key_for(path: &Path) -> Option<String> {
        if path.extension()? != EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = URL_SAFE_NO_PAD.decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn read(path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Self::read(&self.path_for(key)).await
    }

    async fn save(&self, key: &str, record: String) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        let _guard = self.write.lock().await;
        tokio::fs::write(&tmp, record.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        event!(Level::TRACE, key, "Record written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);

        let _guard = self.write.lock().await;
        let previous = Self::read(&path).await?;
        if previous.is_some() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(previous)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = Self::key_for(&entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}
