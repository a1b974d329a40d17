//! Local content provider.
//!
//! Serves blob content from a directory on disk, standing in for a remote
//! content API. Also builds a manifest by walking that directory.

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::provider::ContentProvider;
use repofs_types::{ContentError, FsError, FsResult, Manifest, ManifestEntry};

/// Directory names never included in a walked manifest.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Content provider rooted at a local directory.
///
/// All paths are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `get_content("src/main.rs")` reads
/// `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalContentProvider {
    root: PathBuf,
}

impl LocalContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path within the root without following symlinks.
    ///
    /// Rejects any path that would escape the root via `..`.
    fn resolve(&self, path: &str) -> Result<PathBuf, ContentError> {
        let mut resolved = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(c) => resolved.push(c),
                Component::CurDir => {}
                _ => {
                    return Err(ContentError::Fetch(format!("path escapes root: {path}")));
                }
            }
        }
        Ok(resolved)
    }

    /// Build a manifest of every file under the root, mounted at `repo_root`.
    ///
    /// Entries are sorted by path. `.git` directories are skipped.
    pub async fn manifest(&self, repo_root: &str) -> FsResult<Manifest> {
        let mut entries = Vec::new();
        let mut stack = vec![PathBuf::new()];

        while let Some(relative) = stack.pop() {
            let mut dir = fs::read_dir(self.root.join(&relative)).await?;
            while let Some(entry) = dir.next_entry().await? {
                let name = entry.file_name();
                let child = relative.join(&name);
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if !SKIPPED_DIRS.iter().any(|s| name == *s) {
                        stack.push(child);
                    }
                } else if file_type.is_file() {
                    let metadata = entry.metadata().await?;
                    let path = child.to_str().ok_or_else(|| {
                        FsError::invalid(format!("non-UTF-8 path: {}", child.display()))
                    })?;
                    entries.push(ManifestEntry {
                        path: path.to_string(),
                        mode: file_mode(&metadata),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(root = %self.root.display(), files = entries.len(), "walked local snapshot");
        Ok(Manifest::new(repo_root, entries))
    }
}

/// Extract the file mode from std::fs::Metadata (unix only).
#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> u32 {
    repofs_types::DEFAULT_FILE_MODE
}

#[async_trait]
impl ContentProvider for LocalContentProvider {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full_path = self.resolve(path)?;
        fs::read(&full_path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(path.to_string()),
            _ => ContentError::Fetch(format!("{path}: {e}")),
        })
    }
}
