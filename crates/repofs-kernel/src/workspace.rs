//! Workspace: the overlay plus everything built on it, wired from a manifest.
//!
//! ```text
//! Workspace
//! ├── fs                 WorkspaceFs      stat/readdir/read/write/rm/rename
//! ├── source_control     SourceControl    status()
//! ├── source_control_fs  SourceControlFs  current vs. original, diff
//! └── blobs              CachedBlobLister list_all_blobs(), keyed on fs mtime
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{MissingContent, OverlayConfig};
use crate::paths;
use crate::scm::{BlobLister, CachedBlobLister, ModifiedTimeSource, SourceControl, SourceControlFs};
use crate::vfs::{ContentProvider, ContentTree, EmptyOnNotFound, Filesystem, MemoryFs, OpenFlags, OverlayFs};
use repofs_types::{DirEntry, FileStats, FileType, FsResult, Manifest, DEFAULT_FILE_MODE};

/// Options for [`WorkspaceFs::rm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmOptions {
    pub recursive: bool,
}

/// The filesystem surface the rest of an application talks to.
#[derive(Debug, Clone)]
pub struct WorkspaceFs {
    overlay: Arc<OverlayFs>,
}

impl WorkspaceFs {
    pub fn new(overlay: Arc<OverlayFs>) -> Self {
        Self { overlay }
    }

    pub async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        self.overlay.stat(path).await
    }

    pub async fn readdir(&self, path: &Path) -> FsResult<Vec<String>> {
        self.overlay.readdir(path).await
    }

    pub async fn readdir_with_types(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.overlay.readdir_with_types(path).await
    }

    pub async fn mkdir(&self, path: &Path) -> FsResult<()> {
        self.overlay.mkdir(path).await
    }

    pub async fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.overlay.read_file(path).await
    }

    /// Replace the file's content, creating it and its parents if needed.
    pub async fn write_file(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let mut file = self
            .overlay
            .open(path, OpenFlags::write(), DEFAULT_FILE_MODE)
            .await?;
        file.write(data)?;
        file.close().await
    }

    /// Remove a file or directory. Without `recursive`, a directory must be empty.
    pub async fn rm(&self, path: &Path, options: RmOptions) -> FsResult<()> {
        let path = paths::normalize(path);
        // Rejected up front: a recursive removal has deleted children by the
        // time rmdir would see the target.
        self.overlay.check_removable(&path)?;
        if !self.overlay.stat(&path).await?.is_directory() {
            return self.overlay.unlink(&path).await;
        }
        if !options.recursive {
            return self.overlay.rmdir(&path).await;
        }

        // Parents are visited before their children, so rmdir runs in reverse.
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut files: Vec<PathBuf> = Vec::new();
        let mut stack = vec![path];
        while let Some(dir) = stack.pop() {
            for entry in self.overlay.readdir_with_types(&dir).await? {
                let child = dir.join(&entry.name);
                if entry.file_type == FileType::Directory {
                    stack.push(child);
                } else {
                    files.push(child);
                }
            }
            dirs.push(dir);
        }

        for file in &files {
            self.overlay.unlink(file).await?;
        }
        for dir in dirs.iter().rev() {
            self.overlay.rmdir(dir).await?;
        }
        Ok(())
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.overlay.rename(from, to).await
    }

    pub async fn exists(&self, path: &Path) -> bool {
        self.overlay.exists(path).await
    }

    /// Aggregate modification time of the repository, epoch ms.
    pub async fn last_modified_time(&self) -> FsResult<u64> {
        self.overlay.modified_time().await
    }
}

#[async_trait]
impl ModifiedTimeSource for WorkspaceFs {
    async fn last_modified_time(&self) -> FsResult<u64> {
        WorkspaceFs::last_modified_time(self).await
    }
}

/// Every system over one overlay.
pub struct Workspace {
    pub fs: WorkspaceFs,
    pub source_control: SourceControl,
    pub source_control_fs: SourceControlFs,
    pub blobs: CachedBlobLister,
    overlay: Arc<OverlayFs>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("overlay", &self.overlay)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Workspace with a fresh in-memory writable layer.
    pub fn new(
        manifest: &Manifest,
        provider: Arc<dyn ContentProvider>,
        config: &OverlayConfig,
    ) -> FsResult<Self> {
        Self::with_store(manifest, provider, Arc::new(MemoryFs::new()), config)
    }

    /// Workspace over an existing writable store, picking up any edits and
    /// tombstones already in it.
    pub fn with_store(
        manifest: &Manifest,
        provider: Arc<dyn ContentProvider>,
        writable: Arc<dyn Filesystem>,
        config: &OverlayConfig,
    ) -> FsResult<Self> {
        let provider: Arc<dyn ContentProvider> = match config.missing_content {
            MissingContent::Error => provider,
            MissingContent::Empty => Arc::new(EmptyOnNotFound::new(provider)),
        };
        let readable = Arc::new(ContentTree::new(manifest, provider)?);
        let overlay = Arc::new(OverlayFs::new(
            readable.clone(),
            writable,
            &config.tombstone_path,
        )?);

        let fs = WorkspaceFs::new(overlay.clone());
        let source_control = SourceControl::new(&overlay);
        let lister = BlobLister::new(&readable, source_control.clone());
        let blobs = CachedBlobLister::new(lister, Arc::new(fs.clone()));
        tracing::debug!(
            repo_root = %overlay.repo_root().display(),
            blobs = readable.blob_paths().len(),
            "workspace ready"
        );

        Ok(Self {
            fs,
            source_control,
            source_control_fs: SourceControlFs::new(overlay.clone()),
            blobs,
            overlay,
        })
    }

    pub fn overlay(&self) -> &Arc<OverlayFs> {
        &self.overlay
    }

    pub fn repo_root(&self) -> &Path {
        self.overlay.repo_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_manifest, sample_workspace, StaticContentProvider};
    use repofs_types::FsError;

    #[tokio::test]
    async fn write_file_then_read() {
        let (ws, _) = sample_workspace().unwrap();
        let path = Path::new("/repo/deep/new/file.txt");
        ws.fs.write_file(path, b"hi").await.unwrap();
        assert_eq!(ws.fs.read_file(path).await.unwrap(), b"hi");
        assert!(ws.fs.stat(Path::new("/repo/deep")).await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn rm_non_recursive_needs_empty_dir() {
        let (ws, _) = sample_workspace().unwrap();
        assert!(matches!(
            ws.fs.rm(Path::new("/repo/foo"), RmOptions::default()).await,
            Err(FsError::DirectoryNotEmpty(_))
        ));
        ws.fs
            .rm(Path::new("/repo/README.md"), RmOptions::default())
            .await
            .unwrap();
        assert!(!ws.fs.exists(Path::new("/repo/README.md")).await);
    }

    #[tokio::test]
    async fn rm_recursive_removes_mixed_layers() {
        let (ws, _) = sample_workspace().unwrap();
        ws.fs
            .write_file(Path::new("/repo/foo/bar/local.txt"), b"l")
            .await
            .unwrap();
        ws.fs
            .rm(Path::new("/repo/foo"), RmOptions { recursive: true })
            .await
            .unwrap();

        assert_eq!(
            ws.fs.readdir(Path::new("/repo")).await.unwrap(),
            vec!["README.md", "tmp"]
        );
        let codes: Vec<char> = ws
            .source_control
            .status()
            .await
            .unwrap()
            .iter()
            .map(|s| s.code())
            .collect();
        assert_eq!(codes, vec!['D', 'D']);
    }

    #[tokio::test]
    async fn rm_refuses_mount_points_before_touching_children() {
        let (ws, _) = sample_workspace().unwrap();
        for target in ["/repo", "/"] {
            assert!(matches!(
                ws.fs.rm(Path::new(target), RmOptions { recursive: true }).await,
                Err(FsError::PermissionDenied(_))
            ));
        }
        assert_eq!(
            ws.fs.readdir(Path::new("/repo")).await.unwrap(),
            vec!["README.md", "foo", "tmp"]
        );
        assert!(ws.source_control.status().await.unwrap().is_empty());
    }

    #[test]
    fn tombstone_path_inside_the_repo_is_rejected() {
        let config = OverlayConfig {
            tombstone_path: PathBuf::from("/repo/foo/.log"),
            ..OverlayConfig::default()
        };
        let provider: Arc<dyn ContentProvider> = Arc::new(crate::testing::sample_provider());
        assert!(matches!(
            Workspace::new(&sample_manifest(), provider, &config),
            Err(FsError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn missing_content_policy() {
        let manifest = Manifest::from_blob_paths("/repo", ["gone.bin"]);
        let provider: Arc<dyn ContentProvider> = Arc::new(StaticContentProvider::new());

        let strict = Workspace::new(&manifest, provider.clone(), &OverlayConfig::default()).unwrap();
        assert!(strict.fs.read_file(Path::new("/repo/gone.bin")).await.is_err());

        let config = OverlayConfig {
            missing_content: MissingContent::Empty,
            ..OverlayConfig::default()
        };
        let lenient = Workspace::new(&manifest, provider, &config).unwrap();
        assert!(lenient
            .fs
            .read_file(Path::new("/repo/gone.bin"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn with_store_resumes_existing_edits() {
        let store: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let provider: Arc<dyn ContentProvider> = Arc::new(crate::testing::sample_provider());
        let config = OverlayConfig::default();

        let first = Workspace::with_store(&sample_manifest(), provider.clone(), store.clone(), &config)
            .unwrap();
        first.fs.rm(Path::new("/repo/README.md"), RmOptions::default()).await.unwrap();
        drop(first);

        let second = Workspace::with_store(&sample_manifest(), provider, store, &config).unwrap();
        assert!(!second.fs.exists(Path::new("/repo/README.md")).await);
        assert_eq!(second.source_control.status().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn last_modified_time_moves() {
        let (ws, _) = sample_workspace().unwrap();
        let before = ws.fs.last_modified_time().await.unwrap();
        ws.fs.mkdir(Path::new("/repo/x")).await.unwrap();
        assert!(ws.fs.last_modified_time().await.unwrap() > before);
    }
}
