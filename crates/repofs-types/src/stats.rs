//! File metadata types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// File type mask of a mode word.
pub const S_IFMT: u32 = 0o170000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file type bits.
pub const S_IFREG: u32 = 0o100000;
/// Owner write permission.
pub const S_IWUSR: u32 = 0o200;

pub const DEFAULT_FILE_MODE: u32 = 0o100644;
pub const DEFAULT_DIR_MODE: u32 = 0o040755;

/// Milliseconds since the Unix epoch, saturating at zero for earlier times.
pub fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

/// Metadata about a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub file_type: FileType,
    /// Numeric mode: type bits plus permission bits.
    pub mode: u32,
    /// Size in bytes. `None` when not yet known (an unhydrated remote blob).
    pub size: Option<u64>,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
}

impl FileStats {
    pub fn file(size: Option<u64>, mode: u32, time: SystemTime) -> Self {
        Self {
            file_type: FileType::File,
            mode: (mode & !S_IFMT) | S_IFREG,
            size,
            ctime: time,
            mtime: time,
        }
    }

    pub fn directory(mode: u32, time: SystemTime) -> Self {
        Self {
            file_type: FileType::Directory,
            mode: (mode & !S_IFMT) | S_IFDIR,
            size: Some(0),
            ctime: time,
            mtime: time,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Size with the `-1` convention for "unknown".
    pub fn size_or_unknown(&self) -> i64 {
        self.size.map(|s| s as i64).unwrap_or(-1)
    }

    pub fn mtime_millis(&self) -> u64 {
        millis(self.mtime)
    }

    /// Same stats with the owner write bit forced on.
    pub fn with_writable(mut self) -> Self {
        self.mode |= S_IWUSR;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.mode & S_IWUSR != 0
    }

    /// Cache fingerprint, available once the size is known.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.size.map(|size| Fingerprint {
            size,
            mtime_ms: self.mtime_millis(),
        })
    }
}

/// `(size, mtime)` pair used as a cheap cache-invalidation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime_ms: u64,
}

/// A directory entry with its type, as returned by `readdir_with_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
        }
    }
}
