//! LocalFileSystem - `FileSystem` on top of `tokio::fs`.

use std::path::Path;

use async_trait::async_trait;

use crate::error::FileSystemError;
use crate::ports::FileSystem;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool, FileSystemError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| FileSystemError::from_io(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<(), FileSystemError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| FileSystemError::from_io(path, e))
    }
}
