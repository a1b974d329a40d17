//! End-to-end scenarios over the sample repository.
//!
//! The sample manifest mounts four blobs under `/repo`:
//!
//! ```text
//! /repo/README.md
//! /repo/foo/README.md
//! /repo/foo/bar/index.js
//! /repo/tmp/.gitkeep
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use repofs_kernel::testing::{sample_manifest, sample_provider, sample_workspace};
use repofs_kernel::{
    ContentProvider, DirEntry, FileStats, FileStatus, Filesystem, FsError, FsResult, MemoryFs,
    OverlayConfig, RmOptions, Workspace,
};

fn setup() -> (Workspace, std::sync::Arc<repofs_kernel::testing::StaticContentProvider>) {
    sample_workspace().expect("failed to build sample workspace")
}

fn p(s: &str) -> &Path {
    Path::new(s)
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn delete_everything_under_foo() {
    let (ws, _) = setup();
    ws.fs.rm(p("/repo/foo/bar/index.js"), RmOptions::default()).await.unwrap();
    ws.fs.rm(p("/repo/foo/README.md"), RmOptions::default()).await.unwrap();
    ws.fs.rm(p("/repo/foo/bar"), RmOptions::default()).await.unwrap();
    ws.fs.rm(p("/repo/foo"), RmOptions::default()).await.unwrap();

    assert_eq!(ws.fs.readdir(p("/repo")).await.unwrap(), vec!["README.md", "tmp"]);
    assert_eq!(
        *ws.blobs.list_all_blobs().await.unwrap(),
        set(&["/README.md", "/tmp/.gitkeep"])
    );
}

#[tokio::test]
async fn modify_then_restore_readme() {
    let (ws, _) = setup();
    let readme = p("/repo/README.md");
    let original = ws.fs.read_file(readme).await.unwrap();

    ws.fs.write_file(readme, b"# Rewritten\n").await.unwrap();
    assert_eq!(
        ws.source_control.status().await.unwrap(),
        vec![FileStatus::Modified {
            path: "/README.md".into(),
            content: b"# Rewritten\n".to_vec(),
        }]
    );

    ws.fs.write_file(readme, &original).await.unwrap();
    assert!(ws.source_control.status().await.unwrap().is_empty());
}

#[tokio::test]
async fn rename_a_remote_directory_twice() {
    let (ws, _) = setup();
    ws.fs.rename(p("/repo/tmp"), p("/repo/foo/tmp")).await.unwrap();
    ws.fs
        .rename(p("/repo/foo/tmp"), p("/repo/foo/bar/tmp_4"))
        .await
        .unwrap();

    assert_eq!(
        ws.source_control.status().await.unwrap(),
        vec![
            FileStatus::Deleted {
                path: "/tmp/.gitkeep".into()
            },
            FileStatus::Created {
                path: "/foo/bar/tmp_4/.gitkeep".into(),
                content: Vec::new(),
            },
        ]
    );
    assert!(!ws.fs.exists(p("/repo/tmp")).await);
    assert!(!ws.fs.exists(p("/repo/foo/tmp")).await);
    assert_eq!(
        ws.fs.readdir(p("/repo/foo/bar")).await.unwrap(),
        vec!["index.js", "tmp_4"]
    );
}

#[tokio::test]
async fn hydration_is_idempotent() {
    let (ws, provider) = setup();
    let path = p("/repo/foo/bar/index.js");
    let first = ws.fs.read_file(path).await.unwrap();
    let second = ws.fs.read_file(path).await.unwrap();

    assert_eq!(first, b"export default 42;\n");
    assert_eq!(first, second);
    assert_eq!(provider.calls("foo/bar/index.js"), 1);
}

#[tokio::test]
async fn create_write_rename_round_trip() {
    let (ws, _) = setup();
    ws.fs.write_file(p("/repo/draft.txt"), b"draft").await.unwrap();
    ws.fs.rename(p("/repo/draft.txt"), p("/repo/final.txt")).await.unwrap();

    assert_eq!(ws.fs.read_file(p("/repo/final.txt")).await.unwrap(), b"draft");
    assert!(matches!(
        ws.fs.read_file(p("/repo/draft.txt")).await,
        Err(FsError::NotFound(_))
    ));
}

#[tokio::test]
async fn rename_away_and_back_cancels_out() {
    let (ws, _) = setup();
    ws.fs.rename(p("/repo/README.md"), p("/repo/OLD.md")).await.unwrap();
    let moved = ws.source_control.status().await.unwrap();
    assert_eq!(moved.len(), 2);

    ws.fs.rename(p("/repo/OLD.md"), p("/repo/README.md")).await.unwrap();
    assert!(ws.source_control.status().await.unwrap().is_empty());
    assert_eq!(ws.fs.read_file(p("/repo/README.md")).await.unwrap(), b"# Sample\n");
}

#[tokio::test]
async fn status_is_stable_without_mutation() {
    let (ws, _) = setup();
    ws.fs.write_file(p("/repo/new.txt"), b"n").await.unwrap();
    ws.fs.rm(p("/repo/tmp"), RmOptions { recursive: true }).await.unwrap();

    let first = ws.source_control.status().await.unwrap();
    let second = ws.source_control.status().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn remote_only_directory_rename_materializes_children() {
    let (ws, _) = setup();
    ws.fs.rename(p("/repo/foo"), p("/repo/lib")).await.unwrap();

    assert!(matches!(ws.fs.stat(p("/repo/foo")).await, Err(FsError::NotFound(_))));
    assert_eq!(ws.fs.readdir(p("/repo/lib")).await.unwrap(), vec!["README.md", "bar"]);
    assert_eq!(ws.fs.readdir(p("/repo/lib/bar")).await.unwrap(), vec!["index.js"]);

    let writable = ws.overlay().writable();
    assert!(writable.exists(p("/repo/lib/bar/index.js")).await);
    assert_eq!(
        writable.read(p("/repo/lib/README.md")).await.unwrap(),
        b"# Foo\n"
    );
}

#[tokio::test]
async fn blob_cache_follows_the_facade_clock() {
    let (ws, provider) = setup();
    assert_eq!(ws.blobs.list_all_blobs().await.unwrap().len(), 4);

    ws.fs.write_file(p("/repo/src/main.rs"), b"fn main() {}\n").await.unwrap();
    let blobs = ws.blobs.list_all_blobs().await.unwrap();
    assert!(blobs.contains("/src/main.rs"));
    assert_eq!(blobs.len(), 5);

    // Listing never hydrates anything.
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn failed_mutations_leave_no_trace() {
    let (ws, _) = setup();
    let before = ws.fs.last_modified_time().await.unwrap();

    assert!(ws.fs.mkdir(p("/repo/foo")).await.is_err());
    assert!(ws.fs.rename(p("/repo/missing"), p("/repo/x")).await.is_err());
    assert!(ws.fs.rm(p("/repo/foo"), RmOptions::default()).await.is_err());
    assert!(ws.fs.rename(p("/repo/README.md"), p("/repo/tmp/.gitkeep")).await.is_err());

    assert_eq!(ws.fs.last_modified_time().await.unwrap(), before);
    assert!(ws.source_control.status().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_recursive_rm_removes_nothing() {
    let (ws, _) = setup();
    assert!(matches!(
        ws.fs.rm(p("/repo"), RmOptions { recursive: true }).await,
        Err(FsError::PermissionDenied(_))
    ));

    assert_eq!(ws.fs.readdir(p("/repo")).await.unwrap(), vec!["README.md", "foo", "tmp"]);
    assert!(ws.source_control.status().await.unwrap().is_empty());
    assert_eq!(ws.blobs.list_all_blobs().await.unwrap().len(), 4);
}

#[tokio::test]
async fn fetch_failure_during_file_rename_leaves_no_trace() {
    let (ws, provider) = setup();
    provider.fail_next("README.md");

    assert!(matches!(
        ws.fs.rename(p("/repo/README.md"), p("/repo/docs/README.md")).await,
        Err(FsError::Provider(_))
    ));
    assert_eq!(ws.fs.readdir(p("/repo")).await.unwrap(), vec!["README.md", "foo", "tmp"]);
    assert!(!ws.overlay().writable().exists(p("/repo/docs")).await);
    assert!(ws.source_control.status().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_failure_during_copy_up_leaves_no_trace() {
    let (ws, provider) = setup();
    provider.fail_next("foo/bar/index.js");

    assert!(ws.fs.rename(p("/repo/foo"), p("/repo/lib/foo")).await.is_err());
    assert_eq!(ws.fs.readdir(p("/repo")).await.unwrap(), vec!["README.md", "foo", "tmp"]);
    assert_eq!(ws.fs.readdir(p("/repo/foo/bar")).await.unwrap(), vec!["index.js"]);
    assert!(ws.source_control.status().await.unwrap().is_empty());
    assert_eq!(
        *ws.blobs.list_all_blobs().await.unwrap(),
        set(&["/README.md", "/foo/README.md", "/foo/bar/index.js", "/tmp/.gitkeep"])
    );
}

/// Writable store whose appends can be switched off, so tombstone writes fail.
#[derive(Default)]
struct AppendSwitch {
    inner: MemoryFs,
    refuse_appends: AtomicBool,
}

#[async_trait]
impl Filesystem for AppendSwitch {
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.inner.write(path, data).await
    }

    async fn write_with_mode(&self, path: &Path, data: &[u8], mode: u32) -> FsResult<()> {
        self.inner.write_with_mode(path, data, mode).await
    }

    async fn append(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        if self.refuse_appends.load(Ordering::SeqCst) {
            return Err(FsError::Io(format!("append refused: {}", path.display())));
        }
        self.inner.append(path, data).await
    }

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.inner.list(path).await
    }

    async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        self.inner.stat(path).await
    }

    async fn mkdir(&self, path: &Path) -> FsResult<()> {
        self.inner.mkdir(path).await
    }

    async fn remove(&self, path: &Path) -> FsResult<()> {
        self.inner.remove(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.inner.rename(from, to).await
    }

    fn read_only(&self) -> bool {
        false
    }
}

fn workspace_over(store: Arc<AppendSwitch>) -> Workspace {
    let provider: Arc<dyn ContentProvider> = Arc::new(sample_provider());
    Workspace::with_store(&sample_manifest(), provider, store, &OverlayConfig::default())
        .expect("failed to build workspace")
}

#[tokio::test]
async fn failed_tombstone_append_keeps_remote_files() {
    let store = Arc::new(AppendSwitch::default());
    let ws = workspace_over(store.clone());
    store.refuse_appends.store(true, Ordering::SeqCst);

    assert!(matches!(
        ws.fs.rm(p("/repo/README.md"), RmOptions::default()).await,
        Err(FsError::Io(_))
    ));
    assert!(ws.fs.rm(p("/repo/tmp"), RmOptions { recursive: true }).await.is_err());

    assert!(ws.fs.exists(p("/repo/README.md")).await);
    assert!(ws.fs.exists(p("/repo/tmp/.gitkeep")).await);
    assert!(ws.source_control.status().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_tombstone_append_keeps_local_edits() {
    let store = Arc::new(AppendSwitch::default());
    let ws = workspace_over(store.clone());
    ws.fs.write_file(p("/repo/README.md"), b"# Local\n").await.unwrap();
    store.refuse_appends.store(true, Ordering::SeqCst);

    assert!(ws.fs.rm(p("/repo/README.md"), RmOptions::default()).await.is_err());
    assert_eq!(ws.fs.read_file(p("/repo/README.md")).await.unwrap(), b"# Local\n");
    assert_eq!(
        ws.source_control.status().await.unwrap(),
        vec![FileStatus::Modified {
            path: "/README.md".into(),
            content: b"# Local\n".to_vec(),
        }]
    );
}
