//! OverlayFs: the union of the writable layer, the tombstone log and the
//! remote content tree.
//!
//! Every lookup resolves through the same fixed order: the writable layer
//! wins; otherwise a path is visible if the content tree has it and the log
//! has not tombstoned it or any of its ancestors.
//!
//! Mutations only touch the writable layer and append to the log. Renaming
//! a directory that has remote content first copies that content up into the
//! writable layer, since the tree itself cannot move anything.
//!
//! # Rename is not atomic
//!
//! A rename first fetches what it moves: the blob for a remote file, or a
//! copy-up of every remote descendant for a directory. Copy-up only writes
//! bytes identical to the tree under the old path, so it never changes what
//! the namespace shows. Destination ancestors are created after that, and
//! removed again if the writable rename fails. A failure appending the
//! tombstone after the writable rename leaves the remote content under the
//! old path visible again next to the renamed copy; this is logged and the
//! error is returned, nothing is rolled back. Callers must serialize
//! overlapping mutations themselves.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::content_tree::ContentTree;
use super::file::OverlayFile;
use super::flags::{ExistsAction, MissingAction, OpenFlags};
use super::tombstone::{TombstoneContents, TombstoneKind, TombstoneLog};
use super::traits::Filesystem;
use crate::paths;
use repofs_types::{
    millis, DirEntry, FileStats, FileType, FsError, FsResult, DEFAULT_FILE_MODE, S_IWUSR,
};

/// Where a path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Layer {
    Writable(FileStats),
    Readable(FileStats),
    Absent,
}

impl Layer {
    fn stats(&self) -> Option<&FileStats> {
        match self {
            Layer::Writable(stats) | Layer::Readable(stats) => Some(stats),
            Layer::Absent => None,
        }
    }
}

/// A path's standing in each layer independently.
///
/// `readable` is only set when the tree has the path and it is not deleted.
#[derive(Debug, Default)]
struct Presence {
    writable: Option<FileStats>,
    readable: Option<FileStats>,
}

impl Presence {
    fn effective(&self) -> Option<&FileStats> {
        self.writable.as_ref().or(self.readable.as_ref())
    }
}

pub struct OverlayFs {
    readable: Arc<ContentTree>,
    writable: Arc<dyn Filesystem>,
    tombstones: TombstoneLog,
    repo_root: PathBuf,
}

impl std::fmt::Debug for OverlayFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFs")
            .field("repo_root", &self.repo_root)
            .field("tombstones", &self.tombstones.path())
            .finish()
    }
}

impl OverlayFs {
    /// Compose `readable` and `writable`, keeping the deletion ledger at
    /// `tombstone_path` inside `writable`.
    pub fn new(
        readable: Arc<ContentTree>,
        writable: Arc<dyn Filesystem>,
        tombstone_path: impl AsRef<Path>,
    ) -> FsResult<Self> {
        let tombstone_path = paths::normalize(tombstone_path);
        let repo_root = readable.repo_root().to_path_buf();
        if paths::is_within(&repo_root, &tombstone_path) {
            return Err(FsError::invalid(format!(
                "tombstone log {} would shadow the repository root",
                tombstone_path.display()
            )));
        }
        if paths::is_within(&tombstone_path, &repo_root) {
            return Err(FsError::invalid(format!(
                "tombstone log {} must live outside the repository root {}",
                tombstone_path.display(),
                repo_root.display()
            )));
        }
        Ok(Self {
            tombstones: TombstoneLog::new(writable.clone(), &tombstone_path),
            readable,
            writable,
            repo_root,
        })
    }

    pub fn readable(&self) -> &Arc<ContentTree> {
        &self.readable
    }

    pub fn writable(&self) -> &Arc<dyn Filesystem> {
        &self.writable
    }

    pub fn tombstones(&self) -> &TombstoneLog {
        &self.tombstones
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn tombstone_path(&self) -> &Path {
        self.tombstones.path()
    }

    fn check_protected(&self, path: &Path) -> FsResult<()> {
        if paths::is_within(path, self.tombstones.path()) {
            return Err(FsError::permission_denied(path));
        }
        Ok(())
    }

    fn check_not_mount(&self, path: &Path) -> FsResult<()> {
        if paths::is_root(path) || path == self.repo_root {
            return Err(FsError::permission_denied(path));
        }
        Ok(())
    }

    /// Whether `path` may be removed or moved away.
    ///
    /// Denied for the log, the mount points, and any directory holding the log.
    pub(crate) fn check_removable(&self, path: &Path) -> FsResult<()> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        self.check_not_mount(&path)?;
        if paths::is_within(self.tombstones.path(), &path) {
            return Err(FsError::permission_denied(&path));
        }
        Ok(())
    }

    async fn writable_stat(&self, path: &Path) -> FsResult<Option<FileStats>> {
        match self.writable.stat(path).await {
            Ok(stats) => Ok(Some(stats)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn readable_stat(&self, path: &Path, deleted: &TombstoneContents) -> Option<FileStats> {
        if deleted.is_deleted(path) {
            return None;
        }
        self.readable
            .stat_entry(path)
            .await
            .map(FileStats::with_writable)
    }

    async fn presence(&self, path: &Path, deleted: &TombstoneContents) -> FsResult<Presence> {
        Ok(Presence {
            writable: self.writable_stat(path).await?,
            readable: self.readable_stat(path, deleted).await,
        })
    }

    async fn locate_with(&self, path: &Path, deleted: &TombstoneContents) -> FsResult<Layer> {
        if let Some(stats) = self.writable_stat(path).await? {
            return Ok(Layer::Writable(stats));
        }
        Ok(match self.readable_stat(path, deleted).await {
            Some(stats) => Layer::Readable(stats),
            None => Layer::Absent,
        })
    }

    async fn locate(&self, path: &Path) -> FsResult<Layer> {
        let deleted = self.tombstones.contents().await?;
        self.locate_with(path, &deleted).await
    }

    /// Fails with NotADirectory if any ancestor of `path` is effectively a file.
    async fn check_parent(&self, path: &Path, deleted: &TombstoneContents) -> FsResult<()> {
        let ancestors: Vec<&Path> = paths::ancestors(path).collect();
        for dir in ancestors.into_iter().rev() {
            match self.locate_with(dir, deleted).await? {
                Layer::Writable(stats) | Layer::Readable(stats) if stats.is_file() => {
                    return Err(FsError::not_a_directory(dir));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Create every missing ancestor of `path` in the writable layer.
    ///
    /// Returns the directories it created, outermost first.
    async fn make_parent(&self, path: &Path) -> FsResult<Vec<PathBuf>> {
        let mut missing = Vec::new();
        for dir in paths::ancestors(path) {
            if self.writable_stat(dir).await?.is_some() {
                break;
            }
            missing.push(dir.to_path_buf());
        }
        missing.reverse();
        if let Some(parent) = path.parent() {
            if !missing.is_empty() {
                self.writable.mkdir(parent).await?;
            }
        }
        Ok(missing)
    }

    async fn prepare_parent(&self, path: &Path) -> FsResult<Vec<PathBuf>> {
        let deleted = self.tombstones.contents().await?;
        self.check_parent(path, &deleted).await?;
        self.make_parent(path).await
    }

    /// Undo [`Self::make_parent`] after a later step failed.
    async fn discard_dirs(&self, created: &[PathBuf]) {
        for dir in created.iter().rev() {
            if let Err(e) = self.writable.remove(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "could not remove directory");
            }
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        let path = paths::normalize(path);
        if self.check_protected(&path).is_err() {
            return false;
        }
        matches!(
            self.locate(&path).await,
            Ok(Layer::Writable(_) | Layer::Readable(_))
        )
    }

    pub async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        match self.locate(&path).await? {
            Layer::Writable(stats) | Layer::Readable(stats) => Ok(stats),
            Layer::Absent => Err(FsError::not_found(&path)),
        }
    }

    pub async fn readdir(&self, path: &Path) -> FsResult<Vec<String>> {
        Ok(self
            .readdir_with_types(path)
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect())
    }

    /// Merged listing: writable entries, then remote entries not shadowed or
    /// deleted. Sorted by name, the tombstone log never included.
    pub async fn readdir_with_types(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        let deleted = self.tombstones.contents().await?;
        let presence = self.presence(&path, &deleted).await?;
        match presence.effective() {
            None => return Err(FsError::not_found(&path)),
            Some(stats) if stats.is_file() => return Err(FsError::not_a_directory(&path)),
            Some(_) => {}
        }

        let mut merged: BTreeMap<String, FileType> = BTreeMap::new();
        if presence.writable.as_ref().is_some_and(FileStats::is_directory) {
            for entry in self.writable.list(&path).await? {
                if path.join(&entry.name) == self.tombstones.path() {
                    continue;
                }
                merged.insert(entry.name, entry.file_type);
            }
        }
        if presence.readable.as_ref().is_some_and(FileStats::is_directory) {
            for entry in self.readable.children(&path)? {
                let child = path.join(&entry.name);
                if deleted.is_deleted(&child) || child == self.tombstones.path() {
                    continue;
                }
                merged.entry(entry.name).or_insert(entry.file_type);
            }
        }

        Ok(merged
            .into_iter()
            .map(|(name, file_type)| DirEntry { name, file_type })
            .collect())
    }

    pub async fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        match self.locate(&path).await? {
            Layer::Writable(stats) | Layer::Readable(stats) if stats.is_directory() => {
                Err(FsError::is_a_directory(&path))
            }
            Layer::Writable(_) => self.writable.read(&path).await,
            Layer::Readable(_) => Ok(self.readable.read_blob(&path).await?.as_ref().clone()),
            Layer::Absent => Err(FsError::not_found(&path)),
        }
    }

    pub async fn mkdir(&self, path: &Path) -> FsResult<()> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        if self.locate(&path).await? != Layer::Absent {
            return Err(FsError::already_exists(&path));
        }
        let created = self.prepare_parent(&path).await?;
        if let Err(e) = self.writable.mkdir(&path).await {
            self.discard_dirs(&created).await;
            return Err(e);
        }
        Ok(())
    }

    /// Delete a file from the effective view.
    pub async fn unlink(&self, path: &Path) -> FsResult<()> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        let deleted = self.tombstones.contents().await?;
        let presence = self.presence(&path, &deleted).await?;
        match presence.effective() {
            None => return Err(FsError::not_found(&path)),
            Some(stats) if stats.is_directory() => return Err(FsError::is_a_directory(&path)),
            Some(_) => {}
        }

        // A restored file can be in both layers; each is handled on its own.
        // The tombstone goes first: the writable copy still shadows it if
        // the removal fails.
        if presence.readable.as_ref().is_some_and(FileStats::is_file) {
            self.tombstones.append(TombstoneKind::File, &path).await?;
        }
        if presence.writable.is_some() {
            self.writable.remove(&path).await?;
        }
        Ok(())
    }

    /// Delete an empty directory from the effective view.
    pub async fn rmdir(&self, path: &Path) -> FsResult<()> {
        let path = paths::normalize(path);
        self.check_removable(&path)?;
        let deleted = self.tombstones.contents().await?;
        let presence = self.presence(&path, &deleted).await?;
        match presence.effective() {
            None => return Err(FsError::not_found(&path)),
            Some(stats) if stats.is_file() => return Err(FsError::not_a_directory(&path)),
            Some(_) => {}
        }
        if !self.readdir_with_types(&path).await?.is_empty() {
            return Err(FsError::directory_not_empty(&path));
        }

        if presence.readable.as_ref().is_some_and(FileStats::is_directory) {
            self.tombstones.append(TombstoneKind::Directory, &path).await?;
        }
        if presence.writable.is_some() {
            self.writable.remove(&path).await?;
        }
        Ok(())
    }

    pub async fn rename(&self, old_path: &Path, new_path: &Path) -> FsResult<()> {
        let old_path = paths::normalize(old_path);
        let new_path = paths::normalize(new_path);
        self.check_removable(&old_path)?;
        self.check_protected(&new_path)?;

        let deleted = self.tombstones.contents().await?;
        let presence = self.presence(&old_path, &deleted).await?;
        let Some(stats) = presence.effective().cloned() else {
            return Err(FsError::not_found(&old_path));
        };
        if old_path == new_path {
            return Ok(());
        }
        if paths::is_within(&new_path, &old_path) {
            return Err(FsError::invalid(format!(
                "cannot move {} into itself",
                old_path.display()
            )));
        }
        if self.locate_with(&new_path, &deleted).await? != Layer::Absent {
            return Err(FsError::already_exists(&new_path));
        }
        self.check_parent(&new_path, &deleted).await?;

        // Fetch everything remote before the destination grows any directories.
        let remote = presence.readable.as_ref();
        let (kind, blob) = if stats.is_file() {
            let blob = match presence.writable {
                Some(_) => None,
                None => Some(self.readable.read_blob(&old_path).await?),
            };
            (TombstoneKind::File, blob)
        } else {
            if remote.is_some_and(FileStats::is_directory) {
                self.copy_up(&old_path, &deleted).await?;
            }
            (TombstoneKind::Directory, None)
        };

        let created = self.make_parent(&new_path).await?;
        let moved = match blob {
            Some(bytes) => {
                self.writable
                    .write_with_mode(&new_path, &bytes, stats.mode | S_IWUSR)
                    .await
            }
            None => self.writable.rename(&old_path, &new_path).await,
        };
        if let Err(e) = moved {
            self.discard_dirs(&created).await;
            return Err(e);
        }

        let remote_kind_matches = match kind {
            TombstoneKind::File => remote.is_some_and(FileStats::is_file),
            TombstoneKind::Directory => remote.is_some_and(FileStats::is_directory),
        };
        if remote_kind_matches {
            self.tombstone_after_rename(kind, &old_path, &new_path).await?;
        }
        Ok(())
    }

    async fn tombstone_after_rename(
        &self,
        kind: TombstoneKind,
        old_path: &Path,
        new_path: &Path,
    ) -> FsResult<()> {
        if let Err(e) = self.tombstones.append(kind, old_path).await {
            tracing::warn!(
                from = %old_path.display(),
                to = %new_path.display(),
                error = %e,
                "rename applied but the tombstone was not recorded; the old path is visible again",
            );
            return Err(e);
        }
        Ok(())
    }

    /// Materialize every non-deleted remote descendant of `dir` in the
    /// writable layer. Entries already there are left alone.
    async fn copy_up(&self, dir: &Path, deleted: &TombstoneContents) -> FsResult<()> {
        tracing::debug!(path = %dir.display(), "copying up remote directory");
        let mut copied = 0usize;
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            match self.writable_stat(&current).await? {
                Some(stats) if stats.is_file() => continue,
                Some(_) => {}
                None => self.writable.mkdir(&current).await?,
            }

            let children = match self.readable.children(&current) {
                Ok(children) => children,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for entry in children {
                let child = current.join(&entry.name);
                if deleted.is_deleted(&child) {
                    continue;
                }
                match entry.file_type {
                    FileType::Directory => stack.push(child),
                    FileType::File => {
                        if self.writable_stat(&child).await?.is_some() {
                            continue;
                        }
                        let mode = self
                            .readable
                            .stat_entry(&child)
                            .await
                            .map(|s| s.mode)
                            .unwrap_or(DEFAULT_FILE_MODE);
                        let bytes = self.readable.read_blob(&child).await?;
                        self.writable
                            .write_with_mode(&child, &bytes, mode | S_IWUSR)
                            .await?;
                        copied += 1;
                    }
                }
            }
        }
        tracing::debug!(path = %dir.display(), copied, "copy-up complete");
        Ok(())
    }

    /// Open a file handle. Synced writes always land in the writable layer.
    pub async fn open(&self, path: &Path, flags: OpenFlags, mode: u32) -> FsResult<OverlayFile> {
        let path = paths::normalize(path);
        self.check_protected(&path)?;
        let layer = self.locate(&path).await?;

        let Some(stats) = layer.stats().cloned() else {
            if flags.if_missing == MissingAction::Fail {
                return Err(FsError::not_found(&path));
            }
            let created = self.prepare_parent(&path).await?;
            if let Err(e) = self.writable.write_with_mode(&path, &[], mode).await {
                self.discard_dirs(&created).await;
                return Err(e);
            }
            return Ok(self.handle(path, flags, mode, Vec::new()));
        };
        if stats.is_directory() {
            return Err(FsError::is_a_directory(&path));
        }

        match flags.if_exists {
            ExistsAction::Fail => Err(FsError::already_exists(&path)),
            ExistsAction::Truncate => {
                self.writable
                    .write_with_mode(&path, &[], stats.mode)
                    .await?;
                Ok(self.handle(path, flags, stats.mode, Vec::new()))
            }
            ExistsAction::Nop => {
                let contents = match layer {
                    Layer::Writable(_) => self.writable.read(&path).await?,
                    _ => self.readable.read_blob(&path).await?.as_ref().clone(),
                };
                Ok(self.handle(path, flags, stats.mode, contents))
            }
        }
    }

    fn handle(&self, path: PathBuf, flags: OpenFlags, mode: u32, contents: Vec<u8>) -> OverlayFile {
        OverlayFile::new(path, flags, mode, contents, self.writable.clone())
    }

    pub async fn utimes(&self, path: &Path) -> FsResult<()> {
        Err(FsError::not_supported(format!("utimes {}", path.display())))
    }

    pub async fn chown(&self, path: &Path) -> FsResult<()> {
        Err(FsError::not_supported(format!("chown {}", path.display())))
    }

    pub async fn chmod(&self, path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::not_supported(format!("chmod {}", path.display())))
    }

    /// Latest change anywhere in the repository, in epoch milliseconds.
    ///
    /// The writable layer bumps every ancestor on each mutation, so the
    /// repository root's mtime covers writes and the log's covers deletions.
    pub async fn modified_time(&self) -> FsResult<u64> {
        let root = match self.locate(&self.repo_root).await? {
            Layer::Writable(stats) | Layer::Readable(stats) => stats.mtime_millis(),
            Layer::Absent => 0,
        };
        let log = self.tombstones.modified_time().await?.map(millis).unwrap_or(0);
        Ok(root.max(log))
    }
}

#[async_trait]
impl Filesystem for OverlayFs {
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.read_file(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.write_with_mode(path, data, DEFAULT_FILE_MODE).await
    }

    async fn write_with_mode(&self, path: &Path, data: &[u8], mode: u32) -> FsResult<()> {
        let mut file = self.open(path, OpenFlags::write(), mode).await?;
        file.write(data)?;
        file.close().await
    }

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.readdir_with_types(path).await
    }

    async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        OverlayFs::stat(self, path).await
    }

    async fn mkdir(&self, path: &Path) -> FsResult<()> {
        match OverlayFs::mkdir(self, path).await {
            Err(FsError::AlreadyExists(_)) if self.stat(path).await?.is_directory() => Ok(()),
            other => other,
        }
    }

    async fn remove(&self, path: &Path) -> FsResult<()> {
        if OverlayFs::stat(self, path).await?.is_directory() {
            self.rmdir(path).await
        } else {
            self.unlink(path).await
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        OverlayFs::rename(self, from, to).await
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn exists(&self, path: &Path) -> bool {
        OverlayFs::exists(self, path).await
    }
}
