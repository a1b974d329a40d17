//! repofs-types: pure data types shared by the repofs crates.
//!
//! Nothing in here does I/O. The kernel crate owns the filesystem layers;
//! these are the values that flow between them and out to callers.

pub mod error;
pub mod manifest;
pub mod stats;
pub mod status;

pub use error::{ContentError, FsError, FsResult};
pub use manifest::{Manifest, ManifestEntry};
pub use stats::{
    DirEntry, FileStats, FileType, Fingerprint, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR,
    S_IFMT, S_IFREG, S_IWUSR, millis,
};
pub use status::FileStatus;
