//! Read facade for diff views: the current and the original side of a path.

use similar::TextDiff;
use std::path::Path;
use std::sync::Arc;

use crate::paths;
use crate::vfs::{Filesystem, OverlayFs};
use repofs_types::{FileStats, FsResult};

#[derive(Debug, Clone)]
pub struct SourceControlFs {
    overlay: Arc<OverlayFs>,
}

impl SourceControlFs {
    pub fn new(overlay: Arc<OverlayFs>) -> Self {
        Self { overlay }
    }

    /// Stats as the working copy sees them.
    pub async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        self.overlay.stat(path).await
    }

    /// Stats from the remote snapshot, ignoring local changes and deletions.
    pub async fn stat_original(&self, path: &Path) -> FsResult<FileStats> {
        self.overlay.readable().stat(path).await
    }

    pub async fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.overlay.read_file(path).await
    }

    pub async fn read_file_original(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.overlay.readable().read(path).await
    }

    /// Unified diff from the original to the current content.
    ///
    /// A side that doesn't exist diffs as empty. Identical sides give an
    /// empty string.
    pub async fn diff(&self, path: &Path) -> FsResult<String> {
        let original = or_empty(self.read_file_original(path).await)?;
        let current = or_empty(self.read_file(path).await)?;
        if original == current {
            return Ok(String::new());
        }

        let original = String::from_utf8_lossy(&original);
        let current = String::from_utf8_lossy(&current);
        let name = paths::repo_relative(self.overlay.repo_root(), &paths::normalize(path))
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let diff = TextDiff::from_lines(original.as_ref(), current.as_ref());
        Ok(diff
            .unified_diff()
            .header(&format!("a{name}"), &format!("b{name}"))
            .to_string())
    }
}

fn or_empty(result: FsResult<Vec<u8>>) -> FsResult<Vec<u8>> {
    match result {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        other => other,
    }
}
