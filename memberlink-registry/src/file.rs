//! File-backed document store.
//!
//! Writes replace the whole document atomically: the bytes go to a sibling
//! temp file which is fsynced and then renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use memberlink_core::error::Result;
use memberlink_core::traits::DocumentStore;

/// Document store backed by a single JSON file.
#[derive(Clone, Debug)]
pub struct FileStore {
    /// Path to the registry document
    path: PathBuf,
}

impl FileStore {
    /// Creates a store for `path`. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Read registry document");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry document yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, bytes), fields(path = ?self.path, bytes = bytes.len()))]
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically (write to temp, then rename)
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;

        debug!("Registry document written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
