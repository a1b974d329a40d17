//! Status: what changed relative to the remote snapshot.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths;
use crate::vfs::{ContentTree, Filesystem, OverlayFs, TombstoneReader};
use repofs_types::{FileStatus, FileType, FsResult};

/// Computes [`FileStatus`] entries from the writable layer and the log.
///
/// Holds only a read view of the tombstone log.
#[derive(Clone)]
pub struct SourceControl {
    readable: Arc<ContentTree>,
    writable: Arc<dyn Filesystem>,
    tombstones: TombstoneReader,
    repo_root: PathBuf,
}

impl std::fmt::Debug for SourceControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceControl")
            .field("repo_root", &self.repo_root)
            .finish_non_exhaustive()
    }
}

impl SourceControl {
    pub fn new(overlay: &OverlayFs) -> Self {
        Self {
            readable: overlay.readable().clone(),
            writable: overlay.writable().clone(),
            tombstones: overlay.tombstones().reader(),
            repo_root: overlay.repo_root().to_path_buf(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn relative(&self, path: &Path) -> String {
        paths::repo_relative(&self.repo_root, path)
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    /// Deletions first, then creations and modifications by path.
    ///
    /// A writable file identical to its remote counterpart is not a change,
    /// even if the remote path was tombstoned along the way.
    pub async fn status(&self) -> FsResult<Vec<FileStatus>> {
        let contents = self.tombstones.contents().await?;

        // Directory tombstones are only expanded here, against the tree.
        let mut deleted: BTreeSet<PathBuf> = contents
            .files
            .iter()
            .filter(|path| self.readable.is_blob(path))
            .cloned()
            .collect();
        for dir in &contents.directories {
            deleted.extend(self.readable.blobs_under(dir));
        }

        let mut changes = Vec::new();
        for path in self.writable_files().await? {
            let current = self.writable.read(&path).await?;
            deleted.remove(&path);
            if self.readable.is_blob(&path) {
                let original = self.readable.read_blob(&path).await?;
                if *original != current {
                    changes.push(FileStatus::Modified {
                        path: self.relative(&path),
                        content: current,
                    });
                }
            } else {
                changes.push(FileStatus::Created {
                    path: self.relative(&path),
                    content: current,
                });
            }
        }

        let mut statuses: Vec<FileStatus> = deleted
            .iter()
            .map(|path| FileStatus::Deleted {
                path: self.relative(path),
            })
            .collect();
        statuses.extend(changes);
        tracing::debug!(entries = statuses.len(), "computed status");
        Ok(statuses)
    }

    /// Every file in the writable layer under the repository root, sorted.
    async fn writable_files(&self) -> FsResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![self.repo_root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match self.writable.list(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                let child = dir.join(&entry.name);
                if child == self.tombstones.path() {
                    continue;
                }
                match entry.file_type {
                    FileType::Directory => stack.push(child),
                    FileType::File => files.push(child),
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_manifest, sample_provider};
    use crate::vfs::MemoryFs;

    fn overlay() -> OverlayFs {
        let tree = ContentTree::new(&sample_manifest(), Arc::new(sample_provider())).unwrap();
        OverlayFs::new(Arc::new(tree), Arc::new(MemoryFs::new()), "/.deleted_files.log").unwrap()
    }

    #[tokio::test]
    async fn clean_overlay_has_no_status() {
        let fs = overlay();
        assert!(SourceControl::new(&fs).status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_and_deleted() {
        let fs = overlay();
        let scm = SourceControl::new(&fs);
        fs.write(Path::new("/repo/new.txt"), b"new").await.unwrap();
        fs.unlink(Path::new("/repo/foo/README.md")).await.unwrap();

        assert_eq!(
            scm.status().await.unwrap(),
            vec![
                FileStatus::Deleted {
                    path: "/foo/README.md".into()
                },
                FileStatus::Created {
                    path: "/new.txt".into(),
                    content: b"new".to_vec()
                },
            ]
        );
    }

    #[tokio::test]
    async fn directory_tombstones_expand_to_blobs() {
        let fs = overlay();
        fs.rename(Path::new("/repo/foo"), Path::new("/repo/baz"))
            .await
            .unwrap();
        let statuses = SourceControl::new(&fs).status().await.unwrap();
        let codes: Vec<(char, &str)> = statuses.iter().map(|s| (s.code(), s.path())).collect();
        assert_eq!(
            codes,
            vec![
                ('D', "/foo/README.md"),
                ('D', "/foo/bar/index.js"),
                ('A', "/baz/README.md"),
                ('A', "/baz/bar/index.js"),
            ]
        );
    }

    #[tokio::test]
    async fn copied_up_files_are_not_modified() {
        let fs = overlay();
        let mut file = fs
            .open(
                Path::new("/repo/README.md"),
                crate::vfs::OpenFlags::parse("r+").unwrap(),
                repofs_types::DEFAULT_FILE_MODE,
            )
            .await
            .unwrap();
        file.write_at(0, b"#").unwrap();
        file.close().await.unwrap();

        assert!(SourceControl::new(&fs).status().await.unwrap().is_empty());
    }
}
