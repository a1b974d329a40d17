//! Parsed-file cache: re-parse a control file only when it changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::Filesystem;
use repofs_types::{Fingerprint, FsError, FsResult};

type Parser<T> = Box<dyn Fn(&[u8]) -> FsResult<T> + Send + Sync>;

/// Memoizes `parse(read(path))` keyed on the file's `(size, mtime)` fingerprint.
///
/// A stat is made on every call; the backing file is only read when the
/// fingerprint differs from the one the cached value was parsed at.
pub struct ParsedFileCache<T> {
    store: Arc<dyn Filesystem>,
    path: PathBuf,
    parse: Parser<T>,
    slot: Mutex<Option<(Fingerprint, Arc<T>)>>,
}

impl<T> fmt::Debug for ParsedFileCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedFileCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync> ParsedFileCache<T> {
    pub fn new<F>(store: Arc<dyn Filesystem>, path: impl Into<PathBuf>, parse: F) -> Self
    where
        F: Fn(&[u8]) -> FsResult<T> + Send + Sync + 'static,
    {
        Self {
            store,
            path: path.into(),
            parse: Box::new(parse),
            slot: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed contents, or `None` if the backing file doesn't exist yet.
    pub async fn get_contents(&self) -> FsResult<Option<Arc<T>>> {
        let mut slot = self.slot.lock().await;

        let stats = match self.store.stat(&self.path).await {
            Ok(stats) => stats,
            Err(e) if e.is_not_found() => {
                *slot = None;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if stats.is_directory() {
            return Err(FsError::is_a_directory(&self.path));
        }

        let fingerprint = stats.fingerprint();
        if let (Some(current), Some((cached, value))) = (fingerprint, slot.as_ref()) {
            if current == *cached {
                return Ok(Some(value.clone()));
            }
        }

        tracing::debug!(path = %self.path.display(), ?fingerprint, "re-parsing control file");
        let bytes = self.store.read(&self.path).await?;
        let value = Arc::new((self.parse)(&bytes)?);
        *slot = fingerprint.map(|f| (f, value.clone()));
        Ok(Some(value))
    }

    /// Drop the cached value; the next call re-reads the file.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn line_counter(store: Arc<dyn Filesystem>, parses: Arc<AtomicUsize>) -> ParsedFileCache<usize> {
        ParsedFileCache::new(store, "/control.log", move |bytes: &[u8]| {
            parses.fetch_add(1, Ordering::SeqCst);
            Ok(bytes.iter().filter(|b| **b == b'\n').count())
        })
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let store: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = line_counter(store, parses.clone());

        assert!(cache.get_contents().await.unwrap().is_none());
        assert_eq!(parses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parses_once_per_fingerprint() {
        let store: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = line_counter(store.clone(), parses.clone());

        store.write(Path::new("/control.log"), b"a\n").await.unwrap();
        assert_eq!(*cache.get_contents().await.unwrap().unwrap(), 1);
        assert_eq!(*cache.get_contents().await.unwrap().unwrap(), 1);
        assert_eq!(parses.load(Ordering::SeqCst), 1);

        store.append(Path::new("/control.log"), b"b\n").await.unwrap();
        assert_eq!(*cache.get_contents().await.unwrap().unwrap(), 2);
        assert_eq!(parses.load(Ordering::SeqCst), 2);

        cache.invalidate().await;
        assert_eq!(*cache.get_contents().await.unwrap().unwrap(), 2);
        assert_eq!(parses.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deleted_file_clears_the_slot() {
        let store: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let parses = Arc::new(AtomicUsize::new(0));
        let cache = line_counter(store.clone(), parses.clone());

        store.write(Path::new("/control.log"), b"a\n").await.unwrap();
        assert!(cache.get_contents().await.unwrap().is_some());
        store.remove(Path::new("/control.log")).await.unwrap();
        assert!(cache.get_contents().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn parse_errors_propagate() {
        let store: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        store.write(Path::new("/bad"), b"x").await.unwrap();
        let cache: ParsedFileCache<()> =
            ParsedFileCache::new(store, "/bad", |_: &[u8]| Err(FsError::invalid("nope")));

        assert!(matches!(cache.get_contents().await, Err(FsError::Invalid(_))));
    }
}
