//! Remote tree manifest: the `{ path, mode }` listing a snapshot is built from.

use serde::{Deserialize, Serialize};

use crate::stats::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR, S_IFMT};

fn default_mode() -> u32 {
    DEFAULT_FILE_MODE
}

/// One entry of the remote tree. Paths are repository-relative (`foo/bar.js`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
}

impl ManifestEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn tree(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: DEFAULT_DIR_MODE,
        }
    }

    /// Tree entries carry directory type bits; everything else is a blob.
    pub fn is_tree(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Manifest plus the absolute prefix the tree is mounted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub repo_root: String,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(repo_root: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            repo_root: repo_root.into(),
            entries,
        }
    }

    /// Manifest of blobs only, all with the default file mode.
    pub fn from_blob_paths<I, S>(repo_root: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(repo_root, paths.into_iter().map(ManifestEntry::blob).collect())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn blobs(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| !e.is_tree())
    }
}
