//! In-memory filesystem implementation.
//!
//! Backs the writable layer of the overlay. All data is ephemeral.
//!
//! Modification times come from a strictly increasing millisecond clock, and
//! every mutation also stamps each ancestor directory. A directory's mtime is
//! therefore the time of the last change anywhere beneath it, and two
//! mutations never share a `(size, mtime)` fingerprint.

use super::traits::Filesystem;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::paths;
use repofs_types::{
    millis, DirEntry, FileStats, FsError, FsResult, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        mode: u32,
        ctime: SystemTime,
        mtime: SystemTime,
    },
    Directory {
        mode: u32,
        ctime: SystemTime,
        mtime: SystemTime,
    },
}

impl Entry {
    fn directory(time: SystemTime) -> Self {
        Entry::Directory {
            mode: DEFAULT_DIR_MODE,
            ctime: time,
            mtime: time,
        }
    }

    fn touch(&mut self, time: SystemTime) {
        match self {
            Entry::File { mtime, .. } | Entry::Directory { mtime, .. } => *mtime = time,
        }
    }

    fn stats(&self) -> FileStats {
        match self {
            Entry::File {
                data,
                mode,
                ctime,
                mtime,
            } => {
                let mut stats = FileStats::file(Some(data.len() as u64), *mode, *ctime);
                stats.mtime = *mtime;
                stats
            }
            Entry::Directory { mode, ctime, mtime } => {
                let mut stats = FileStats::directory(*mode, *ctime);
                stats.mtime = *mtime;
                stats
            }
        }
    }
}

/// In-memory filesystem.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    last_tick: AtomicU64,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let now = SystemTime::now();
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(PathBuf::from("/"), Entry::directory(now));
        Self {
            entries: RwLock::new(entries),
            last_tick: AtomicU64::new(millis(now)),
        }
    }

    /// Next modification time, strictly after the previous one.
    fn tick(&self) -> SystemTime {
        let now = millis(SystemTime::now());
        let prev = match self
            .last_tick
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        UNIX_EPOCH + Duration::from_millis(now.max(prev + 1))
    }

    /// Ensure all parent directories exist, creating missing ones.
    fn ensure_parents(
        entries: &mut HashMap<PathBuf, Entry>,
        path: &Path,
        time: SystemTime,
    ) -> FsResult<()> {
        let parents: Vec<&Path> = paths::ancestors(path).collect();
        for parent in parents.into_iter().rev() {
            match entries.get(parent) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => return Err(FsError::not_a_directory(parent)),
                None => {
                    entries.insert(parent.to_path_buf(), Entry::directory(time));
                }
            }
        }
        Ok(())
    }

    /// Stamp every ancestor directory of `path` with `time`.
    fn touch_ancestors(entries: &mut HashMap<PathBuf, Entry>, path: &Path, time: SystemTime) {
        for parent in paths::ancestors(path) {
            if let Some(entry) = entries.get_mut(parent) {
                entry.touch(time);
            }
        }
    }

    async fn put_file(&self, path: &Path, data: Vec<u8>, mode: Option<u32>) -> FsResult<()> {
        let normalized = paths::normalize(path);
        let time = self.tick();
        let mut entries = self.entries.write().await;

        // Check we're not overwriting a directory
        let (mode, ctime) = match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => return Err(FsError::is_a_directory(path)),
            Some(Entry::File {
                mode: current,
                ctime,
                ..
            }) => (mode.unwrap_or(*current), *ctime),
            None => (mode.unwrap_or(DEFAULT_FILE_MODE), time),
        };

        Self::ensure_parents(&mut entries, &normalized, time)?;
        entries.insert(
            normalized.clone(),
            Entry::File {
                data,
                mode,
                ctime,
                mtime: time,
            },
        );
        Self::touch_ancestors(&mut entries, &normalized, time);
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let normalized = paths::normalize(path);
        let entries = self.entries.read().await;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.put_file(path, data.to_vec(), None).await
    }

    async fn write_with_mode(&self, path: &Path, data: &[u8], mode: u32) -> FsResult<()> {
        self.put_file(path, data.to_vec(), Some(mode)).await
    }

    async fn append(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let normalized = paths::normalize(path);
        let time = self.tick();
        let mut entries = self.entries.write().await;

        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: existing,
                mtime,
                ..
            }) => {
                existing.extend_from_slice(data);
                *mtime = time;
            }
            Some(Entry::Directory { .. }) => return Err(FsError::is_a_directory(path)),
            None => {
                Self::ensure_parents(&mut entries, &normalized, time)?;
                entries.insert(
                    normalized.clone(),
                    Entry::File {
                        data: data.to_vec(),
                        mode: DEFAULT_FILE_MODE,
                        ctime: time,
                        mtime: time,
                    },
                );
            }
        }
        Self::touch_ancestors(&mut entries, &normalized, time);
        Ok(())
    }

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let normalized = paths::normalize(path);
        let entries = self.entries.read().await;

        // Verify the path is a directory
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::not_a_directory(path)),
            None => return Err(FsError::not_found(path)),
        }

        // Find all direct children
        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(entry_path, _)| entry_path.parent() == Some(normalized.as_path()))
            .map(|(entry_path, entry)| {
                let name = paths::file_name(entry_path);
                match entry {
                    Entry::File { .. } => DirEntry::file(name),
                    Entry::Directory { .. } => DirEntry::directory(name),
                }
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        let normalized = paths::normalize(path);
        let entries = self.entries.read().await;

        entries
            .get(&normalized)
            .map(Entry::stats)
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn mkdir(&self, path: &Path) -> FsResult<()> {
        let normalized = paths::normalize(path);
        let time = self.tick();
        let mut entries = self.entries.write().await;

        // Check if something already exists
        if let Some(existing) = entries.get(&normalized) {
            return match existing {
                Entry::Directory { .. } => Ok(()), // Already exists, fine
                Entry::File { .. } => Err(FsError::already_exists(path)),
            };
        }

        Self::ensure_parents(&mut entries, &normalized, time)?;
        entries.insert(normalized.clone(), Entry::directory(time));
        Self::touch_ancestors(&mut entries, &normalized, time);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> FsResult<()> {
        let normalized = paths::normalize(path);

        if paths::is_root(&normalized) {
            return Err(FsError::PermissionDenied(
                "cannot remove root directory".into(),
            ));
        }

        let time = self.tick();
        let mut entries = self.entries.write().await;

        // Check if it's a non-empty directory
        if let Some(Entry::Directory { .. }) = entries.get(&normalized) {
            let has_children = entries
                .keys()
                .any(|k| k.parent() == Some(normalized.as_path()));
            if has_children {
                return Err(FsError::directory_not_empty(path));
            }
        }

        entries
            .remove(&normalized)
            .ok_or_else(|| FsError::not_found(path))?;
        Self::touch_ancestors(&mut entries, &normalized, time);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let from_normalized = paths::normalize(from);
        let to_normalized = paths::normalize(to);

        if paths::is_root(&from_normalized) {
            return Err(FsError::PermissionDenied(
                "cannot rename root directory".into(),
            ));
        }
        if from_normalized == to_normalized {
            return Ok(());
        }
        if to_normalized.starts_with(&from_normalized) {
            return Err(FsError::invalid(format!(
                "cannot move {} into itself",
                from.display()
            )));
        }

        let time = self.tick();
        let mut entries = self.entries.write().await;

        let entry = entries
            .get(&from_normalized)
            .cloned()
            .ok_or_else(|| FsError::not_found(from))?;

        match to_normalized.parent().and_then(|p| entries.get(p)) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::not_a_directory(to)),
            None => return Err(FsError::not_found(to)),
        }

        // Check we're not overwriting a directory with a file or vice versa
        if let Some(existing) = entries.get(&to_normalized) {
            match (&entry, existing) {
                (Entry::File { .. }, Entry::Directory { .. }) => {
                    return Err(FsError::is_a_directory(to));
                }
                (Entry::Directory { .. }, Entry::File { .. }) => {
                    return Err(FsError::not_a_directory(to));
                }
                (Entry::Directory { .. }, Entry::Directory { .. }) => {
                    let occupied = entries
                        .keys()
                        .any(|k| k.parent() == Some(to_normalized.as_path()));
                    if occupied {
                        return Err(FsError::directory_not_empty(to));
                    }
                }
                (Entry::File { .. }, Entry::File { .. }) => {}
            }
        }

        entries.remove(&from_normalized);

        // For directories, we need to rename all children too
        if matches!(entry, Entry::Directory { .. }) {
            // Collect paths to rename (can't modify while iterating)
            let children: Vec<PathBuf> = entries
                .keys()
                .filter(|k| k.starts_with(&from_normalized))
                .cloned()
                .collect();

            for old_path in children {
                let Ok(relative) = old_path.strip_prefix(&from_normalized) else {
                    continue;
                };
                let new_path = to_normalized.join(relative);
                if let Some(child) = entries.remove(&old_path) {
                    entries.insert(new_path, child);
                }
            }
        }

        let mut entry = entry;
        entry.touch(time);
        entries.insert(to_normalized.clone(), entry);
        Self::touch_ancestors(&mut entries, &from_normalized, time);
        Self::touch_ancestors(&mut entries, &to_normalized, time);
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/test.txt"), b"hello world").await.unwrap();
        let data = fs.read(Path::new("/test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MemoryFs::new();
        let result = fs.read(Path::new("/nonexistent.txt")).await;
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_nested_directories() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a/b/c/file.txt"), b"nested").await.unwrap();

        // Should have created parent directories
        for dir in ["/a", "/a/b", "/a/b/c"] {
            let meta = fs.stat(Path::new(dir)).await.unwrap();
            assert!(meta.is_directory(), "{dir} should be a directory");
        }

        let data = fs.read(Path::new("/a/b/c/file.txt")).await.unwrap();
        assert_eq!(data, b"nested");
    }

    #[tokio::test]
    async fn test_write_under_file_fails() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a"), b"file").await.unwrap();
        let result = fs.write(Path::new("/a/b.txt"), b"x").await;
        assert!(matches!(result, Err(FsError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_list_directory() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a.txt"), b"a").await.unwrap();
        fs.write(Path::new("/b.txt"), b"b").await.unwrap();
        fs.mkdir(Path::new("/subdir")).await.unwrap();

        let entries = fs.list(Path::new("/")).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry::file("a.txt"),
                DirEntry::file("b.txt"),
                DirEntry::directory("subdir"),
            ]
        );
    }

    #[tokio::test]
    async fn test_mode_is_kept_on_overwrite() {
        let fs = MemoryFs::new();
        fs.write_with_mode(Path::new("/run.sh"), b"#!", 0o100755)
            .await
            .unwrap();
        fs.write(Path::new("/run.sh"), b"#!/bin/sh").await.unwrap();
        let meta = fs.stat(Path::new("/run.sh")).await.unwrap();
        assert_eq!(meta.mode, 0o100755);
        assert_eq!(meta.size, Some(9));
    }

    #[tokio::test]
    async fn test_append_creates_then_extends() {
        let fs = MemoryFs::new();
        fs.append(Path::new("/log/records"), b"one\n").await.unwrap();
        fs.append(Path::new("/log/records"), b"two\n").await.unwrap();
        let data = fs.read(Path::new("/log/records")).await.unwrap();
        assert_eq!(data, b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_mtime_strictly_increases_and_bubbles_up() {
        let fs = MemoryFs::new();
        fs.mkdir(Path::new("/repo/deep")).await.unwrap();
        let before = fs.stat(Path::new("/repo")).await.unwrap().mtime_millis();

        fs.write(Path::new("/repo/deep/a.txt"), b"a").await.unwrap();
        let first = fs.stat(Path::new("/repo/deep/a.txt")).await.unwrap();
        let after = fs.stat(Path::new("/repo")).await.unwrap().mtime_millis();
        assert!(after > before);
        assert_eq!(after, first.mtime_millis());

        // Same size, rewritten immediately: the fingerprint still changes
        fs.write(Path::new("/repo/deep/a.txt"), b"b").await.unwrap();
        let second = fs.stat(Path::new("/repo/deep/a.txt")).await.unwrap();
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[tokio::test]
    async fn test_remove_file() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/file.txt"), b"data").await.unwrap();

        fs.remove(Path::new("/file.txt")).await.unwrap();

        assert!(!fs.exists(Path::new("/file.txt")).await);
    }

    #[tokio::test]
    async fn test_remove_non_empty_directory_fails() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/dir/file.txt"), b"data").await.unwrap();

        let result = fs.remove(Path::new("/dir")).await;
        assert!(matches!(result, Err(FsError::DirectoryNotEmpty(_))));
    }

    #[tokio::test]
    async fn test_remove_root_fails() {
        let fs = MemoryFs::new();
        let result = fs.remove(Path::new("/")).await;
        assert!(matches!(result, Err(FsError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a/b/c.txt"), b"data").await.unwrap();

        // Various path forms should all work
        let data1 = fs.read(Path::new("a/b/c.txt")).await.unwrap();
        let data2 = fs.read(Path::new("/a/b/c.txt")).await.unwrap();
        let data3 = fs.read(Path::new("/a/./b/c.txt")).await.unwrap();
        let data4 = fs.read(Path::new("/a/b/../b/c.txt")).await.unwrap();

        assert_eq!(data1, data2);
        assert_eq!(data2, data3);
        assert_eq!(data3, data4);
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/old.txt"), b"content").await.unwrap();

        fs.rename(Path::new("/old.txt"), Path::new("/new.txt"))
            .await
            .unwrap();

        let data = fs.read(Path::new("/new.txt")).await.unwrap();
        assert_eq!(data, b"content");
        assert!(!fs.exists(Path::new("/old.txt")).await);
    }

    #[tokio::test]
    async fn test_rename_directory() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/dir/a.txt"), b"a").await.unwrap();
        fs.write(Path::new("/dir/sub/c.txt"), b"c").await.unwrap();

        fs.rename(Path::new("/dir"), Path::new("/renamed"))
            .await
            .unwrap();

        assert!(fs.exists(Path::new("/renamed/a.txt")).await);
        assert!(fs.exists(Path::new("/renamed/sub/c.txt")).await);
        assert!(!fs.exists(Path::new("/dir")).await);
        assert!(!fs.exists(Path::new("/dir/sub")).await);

        let data = fs.read(Path::new("/renamed/sub/c.txt")).await.unwrap();
        assert_eq!(data, b"c");
    }

    #[tokio::test]
    async fn test_rename_into_itself_fails() {
        let fs = MemoryFs::new();
        fs.mkdir(Path::new("/dir")).await.unwrap();
        let result = fs.rename(Path::new("/dir"), Path::new("/dir/inner")).await;
        assert!(matches!(result, Err(FsError::Invalid(_))));
        assert!(fs.exists(Path::new("/dir")).await);
    }

    #[tokio::test]
    async fn test_rename_requires_destination_parent() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/a.txt"), b"a").await.unwrap();
        let result = fs.rename(Path::new("/a.txt"), Path::new("/missing/a.txt")).await;
        assert!(matches!(result, Err(FsError::NotFound(_))));
        assert!(fs.exists(Path::new("/a.txt")).await);
    }

    #[tokio::test]
    async fn test_rename_not_found() {
        let fs = MemoryFs::new();
        let result = fs.rename(Path::new("/nonexistent"), Path::new("/dest")).await;
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }
}
