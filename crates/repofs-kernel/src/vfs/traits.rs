//! Core VFS trait.

use async_trait::async_trait;
use std::path::Path;

use repofs_types::{DirEntry, FileStats, FsResult, DEFAULT_FILE_MODE};

/// Abstract filesystem interface.
///
/// All paths are absolute and `/`-separated. Implementations normalize them,
/// so `/a/b/` and `/a/./b` address the same entry.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Read the entire contents of a file.
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Write data to a file, creating it (and missing parent directories) if
    /// it doesn't exist. An existing file keeps its mode.
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()>;

    /// Write data to a file and set its mode.
    ///
    /// The default implementation ignores the mode, for stores without one.
    async fn write_with_mode(&self, path: &Path, data: &[u8], mode: u32) -> FsResult<()> {
        let _ = mode;
        self.write(path, data).await
    }

    /// Append data to a file, creating it if it doesn't exist.
    ///
    /// The default implementation reads the whole file and writes it back.
    async fn append(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let mut existing = match self.read(path).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        existing.extend_from_slice(data);
        self.write_with_mode(path, &existing, DEFAULT_FILE_MODE).await
    }

    /// List entries in a directory, sorted by name.
    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &Path) -> FsResult<FileStats>;

    /// Create a directory (and parent directories if needed).
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn mkdir(&self, path: &Path) -> FsResult<()>;

    /// Remove a file or empty directory.
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn remove(&self, path: &Path) -> FsResult<()>;

    /// Rename (move) a file or directory, children included.
    ///
    /// The destination's parent must exist. Returns `Err` if the filesystem
    /// is read-only.
    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}
