//! Test utilities: an in-memory content provider and a sample repository.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::OverlayConfig;
use crate::vfs::ContentProvider;
use crate::workspace::Workspace;
use repofs_types::{ContentError, FsResult, Manifest};

/// Content provider serving fixed bytes, counting every fetch.
#[derive(Debug, Default)]
pub struct StaticContentProvider {
    files: HashMap<String, Vec<u8>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    failures: Mutex<HashSet<String>>,
}

impl StaticContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.files.insert(path.into(), content.as_ref().to_vec());
        self
    }

    /// Make the next fetch of `path` fail with a non-404 error.
    pub fn fail_next(&self, path: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into());
    }

    /// Number of fetches for `path`, failed ones included.
    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for StaticContentProvider {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default() += 1;

        let failed = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if failed {
            return Err(ContentError::Fetch(format!("injected failure: {path}")));
        }

        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}

/// Mount point of the sample repository.
pub const SAMPLE_REPO_ROOT: &str = "/repo";

/// `README.md`, `foo/bar/index.js`, `foo/README.md`, `tmp/.gitkeep`.
pub fn sample_manifest() -> Manifest {
    Manifest::from_blob_paths(
        SAMPLE_REPO_ROOT,
        ["README.md", "foo/bar/index.js", "foo/README.md", "tmp/.gitkeep"],
    )
}

pub fn sample_provider() -> StaticContentProvider {
    StaticContentProvider::new()
        .with_file("README.md", "# Sample\n")
        .with_file("foo/bar/index.js", "export default 42;\n")
        .with_file("foo/README.md", "# Foo\n")
        .with_file("tmp/.gitkeep", "")
}

/// Workspace over the sample repository, plus its provider for call counting.
pub fn sample_workspace() -> FsResult<(Workspace, Arc<StaticContentProvider>)> {
    let provider = Arc::new(sample_provider());
    let workspace = Workspace::new(
        &sample_manifest(),
        provider.clone(),
        &OverlayConfig::default(),
    )?;
    Ok((workspace, provider))
}
