//! The flat list of every blob in the working copy.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::status::SourceControl;
use crate::paths;
use crate::vfs::{ContentTree, OverlayFs};
use repofs_types::{FileStatus, FsResult};

/// Anything that can report an aggregate last-modified time in epoch ms.
#[async_trait]
pub trait ModifiedTimeSource: Send + Sync {
    async fn last_modified_time(&self) -> FsResult<u64>;
}

#[async_trait]
impl ModifiedTimeSource for OverlayFs {
    async fn last_modified_time(&self) -> FsResult<u64> {
        self.modified_time().await
    }
}

/// Blob paths: the manifest's, minus deletions, plus creations.
///
/// Paths are repository-relative with a leading `/`.
#[derive(Debug, Clone)]
pub struct BlobLister {
    initial: BTreeSet<String>,
    source_control: SourceControl,
}

impl BlobLister {
    pub fn new(readable: &ContentTree, source_control: SourceControl) -> Self {
        let root = readable.repo_root();
        let initial = readable
            .blob_paths()
            .iter()
            .filter_map(|path| paths::repo_relative(root, path))
            .collect();
        Self {
            initial,
            source_control,
        }
    }

    pub async fn list_all_blobs(&self) -> FsResult<BTreeSet<String>> {
        let mut blobs = self.initial.clone();
        for status in self.source_control.status().await? {
            match status {
                FileStatus::Deleted { path } => {
                    blobs.remove(&path);
                }
                FileStatus::Created { path, .. } => {
                    blobs.insert(path);
                }
                FileStatus::Modified { .. } => {}
            }
        }
        Ok(blobs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheKey {
    Invalid,
    At(u64),
}

/// [`BlobLister`] memoized on a last-modified time.
///
/// Starts invalid, so the first call always computes.
pub struct CachedBlobLister {
    inner: BlobLister,
    clock: Arc<dyn ModifiedTimeSource>,
    slot: Mutex<(CacheKey, Arc<BTreeSet<String>>)>,
}

impl std::fmt::Debug for CachedBlobLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedBlobLister")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl CachedBlobLister {
    pub fn new(inner: BlobLister, clock: Arc<dyn ModifiedTimeSource>) -> Self {
        Self {
            inner,
            clock,
            slot: Mutex::new((CacheKey::Invalid, Arc::new(BTreeSet::new()))),
        }
    }

    pub async fn list_all_blobs(&self) -> FsResult<Arc<BTreeSet<String>>> {
        let key = CacheKey::At(self.clock.last_modified_time().await?);
        let mut slot = self.slot.lock().await;
        if slot.0 == key {
            return Ok(slot.1.clone());
        }

        tracing::debug!(?key, "recomputing blob list");
        let blobs = Arc::new(self.inner.list_all_blobs().await?);
        *slot = (key, blobs.clone());
        Ok(blobs)
    }

    pub async fn invalidate(&self) {
        self.slot.lock().await.0 = CacheKey::Invalid;
    }
}
