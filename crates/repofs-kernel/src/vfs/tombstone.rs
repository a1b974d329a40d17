//! TombstoneLog: the append-only deletion ledger.
//!
//! Records live in a single file in the writable layer, one per line:
//!
//! ```text
//! file:/repo/foo/bar/index.js
//! dir:/repo/foo
//! ```
//!
//! A directory record covers everything beneath it. Records are never
//! expanded to descendants when written; [`TombstoneContents::is_deleted`]
//! walks ancestors at query time instead.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::parsed_file::ParsedFileCache;
use super::traits::Filesystem;
use crate::paths;
use repofs_types::{FsError, FsResult};

/// What a tombstone record marks as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TombstoneKind {
    File,
    Directory,
}

impl TombstoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TombstoneKind::File => "file",
            TombstoneKind::Directory => "dir",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(TombstoneKind::File),
            "dir" => Some(TombstoneKind::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for TombstoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed ledger: the set of deleted files and the set of deleted directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TombstoneContents {
    pub files: HashSet<PathBuf>,
    pub directories: HashSet<PathBuf>,
}

impl TombstoneContents {
    /// Parse the record stream. Blank lines are ignored; records of an
    /// unknown kind are skipped with a warning.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut contents = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((kind, path)) = line.split_once(':') else {
                tracing::warn!(line = lineno + 1, record = line, "malformed tombstone record");
                continue;
            };
            let path = paths::normalize(path);
            match TombstoneKind::parse(kind) {
                Some(TombstoneKind::File) => {
                    contents.files.insert(path);
                }
                Some(TombstoneKind::Directory) => {
                    contents.directories.insert(path);
                }
                None => {
                    tracing::warn!(line = lineno + 1, kind, "unknown tombstone kind");
                }
            }
        }
        contents
    }

    /// True if `path` itself, or any ancestor directory, has been tombstoned.
    pub fn is_deleted(&self, path: &Path) -> bool {
        let path = paths::normalize(path);
        if self.files.contains(&path) || self.directories.contains(&path) {
            return true;
        }
        paths::ancestors(&path).any(|dir| self.directories.contains(dir))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// Read-only view of the ledger.
///
/// Handed to the source-control side, which must never append.
#[derive(Clone)]
pub struct TombstoneReader {
    store: Arc<dyn Filesystem>,
    cache: Arc<ParsedFileCache<TombstoneContents>>,
}

impl fmt::Debug for TombstoneReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TombstoneReader")
            .field("path", &self.cache.path())
            .finish()
    }
}

impl TombstoneReader {
    pub fn path(&self) -> &Path {
        self.cache.path()
    }

    /// Current contents; empty until the first record is appended.
    pub async fn contents(&self) -> FsResult<Arc<TombstoneContents>> {
        Ok(self
            .cache
            .get_contents()
            .await?
            .unwrap_or_default())
    }

    pub async fn is_deleted(&self, path: &Path) -> FsResult<bool> {
        Ok(self.contents().await?.is_deleted(path))
    }

    /// Modification time of the backing file, `None` if nothing was ever deleted.
    pub async fn modified_time(&self) -> FsResult<Option<SystemTime>> {
        match self.store.stat(self.cache.path()).await {
            Ok(stats) => Ok(Some(stats.mtime)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The ledger itself: append plus the reader's queries.
#[derive(Debug, Clone)]
pub struct TombstoneLog {
    reader: TombstoneReader,
}

impl TombstoneLog {
    /// Ledger backed by `path` in `store`. The file is created on first append.
    pub fn new(store: Arc<dyn Filesystem>, path: impl AsRef<Path>) -> Self {
        let path = paths::normalize(path);
        let cache = ParsedFileCache::new(store.clone(), path, |bytes: &[u8]| {
            Ok(TombstoneContents::parse(bytes))
        });
        Self {
            reader: TombstoneReader {
                store,
                cache: Arc::new(cache),
            },
        }
    }

    /// Record `path` as deleted. Duplicates are allowed.
    pub async fn append(&self, kind: TombstoneKind, path: &Path) -> FsResult<()> {
        let path = paths::normalize(path);
        let record_path = path.to_string_lossy();
        if record_path.contains('\n') {
            return Err(FsError::invalid(format!(
                "newline in tombstoned path: {record_path:?}"
            )));
        }
        let record = format!("{kind}:{record_path}\n");
        tracing::debug!(%kind, path = %record_path, "appending tombstone");
        self.reader
            .store
            .append(self.reader.path(), record.as_bytes())
            .await
    }

    pub fn reader(&self) -> TombstoneReader {
        self.reader.clone()
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub async fn contents(&self) -> FsResult<Arc<TombstoneContents>> {
        self.reader.contents().await
    }

    pub async fn is_deleted(&self, path: &Path) -> FsResult<bool> {
        self.reader.is_deleted(path).await
    }

    pub async fn modified_time(&self) -> FsResult<Option<SystemTime>> {
        self.reader.modified_time().await
    }
}
