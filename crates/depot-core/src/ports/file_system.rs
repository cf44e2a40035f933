//! FileSystem port - the stored-file side of a record.

use std::path::Path;

use async_trait::async_trait;

use crate::error::FileSystemError;

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool, FileSystemError>;

    /// Unlink a file. A file that is already gone fails with
    /// `FileSystemError::NotFound`.
    async fn remove(&self, path: &Path) -> Result<(), FileSystemError>;
}
