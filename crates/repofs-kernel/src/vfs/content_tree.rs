//! ContentTree: the immutable remote tree, hydrated lazily.
//!
//! Built once from a manifest. Directories are synthesized from blob paths;
//! `/` and the repository root exist even for an empty manifest. Blob nodes
//! start unloaded and fetch their bytes from the [`ContentProvider`] on first
//! read, keeping the result for the life of the tree.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::RwLock;

use super::provider::ContentProvider;
use super::traits::Filesystem;
use crate::paths;
use repofs_types::{
    DirEntry, FileStats, FileType, FsError, FsResult, Manifest, DEFAULT_DIR_MODE,
};

/// Blob content: the manifest path to fetch from, or the fetched bytes.
///
/// Transitions exactly once, from `Unloaded` to `Raw`.
#[derive(Debug, Clone)]
enum BlobContent {
    Unloaded { source_path: String },
    Raw(Arc<Vec<u8>>),
}

#[derive(Debug)]
enum NodeKind {
    Blob(RwLock<BlobContent>),
    Tree(BTreeMap<String, FileType>),
}

#[derive(Debug)]
struct Node {
    mode: u32,
    kind: NodeKind,
}

impl Node {
    fn tree(mode: u32) -> Self {
        Self {
            mode,
            kind: NodeKind::Tree(BTreeMap::new()),
        }
    }
}

/// Read-only tree built from a remote manifest.
pub struct ContentTree {
    nodes: HashMap<PathBuf, Node>,
    repo_root: PathBuf,
    provider: Arc<dyn ContentProvider>,
}

impl std::fmt::Debug for ContentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTree")
            .field("repo_root", &self.repo_root)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl ContentTree {
    /// Build the tree for `manifest`, mounted under its repository root.
    ///
    /// Fails with `Invalid` if a manifest path escapes the root or if a path
    /// is used both as a blob and as a directory.
    pub fn new(manifest: &Manifest, provider: Arc<dyn ContentProvider>) -> FsResult<Self> {
        let repo_root = paths::normalize(&manifest.repo_root);
        let mut tree = Self {
            nodes: HashMap::new(),
            repo_root: repo_root.clone(),
            provider,
        };
        tree.nodes
            .insert(PathBuf::from("/"), Node::tree(DEFAULT_DIR_MODE));
        tree.ensure_tree(&repo_root, DEFAULT_DIR_MODE)?;

        for entry in &manifest.entries {
            let relative = Path::new(&entry.path);
            let escapes = relative
                .components()
                .any(|c| matches!(c, Component::ParentDir));
            let mount = paths::mount(&repo_root, &entry.path);
            if escapes || mount == repo_root {
                return Err(FsError::invalid(format!(
                    "manifest path outside the repository: {:?}",
                    entry.path
                )));
            }

            if entry.is_tree() {
                tree.ensure_tree(&mount, entry.mode)?;
                continue;
            }

            if let Some(parent) = mount.parent() {
                tree.ensure_tree(parent, DEFAULT_DIR_MODE)?;
            }
            match tree.nodes.get(&mount) {
                Some(node) if matches!(node.kind, NodeKind::Tree(_)) => {
                    return Err(FsError::invalid(format!(
                        "manifest path is both a blob and a tree: {}",
                        entry.path
                    )));
                }
                Some(_) => continue,
                None => {}
            }
            tree.link(&mount, FileType::File);
            tree.nodes.insert(
                mount,
                Node {
                    mode: entry.mode,
                    kind: NodeKind::Blob(RwLock::new(BlobContent::Unloaded {
                        source_path: entry.path.trim_start_matches('/').to_string(),
                    })),
                },
            );
        }

        Ok(tree)
    }

    /// Create `path` and every missing ancestor as a directory.
    fn ensure_tree(&mut self, path: &Path, mode: u32) -> FsResult<()> {
        let mut chain: Vec<&Path> = path.ancestors().collect();
        chain.reverse();
        for dir in chain {
            match self.nodes.get(dir) {
                Some(node) if matches!(node.kind, NodeKind::Tree(_)) => {}
                Some(_) => {
                    return Err(FsError::invalid(format!(
                        "manifest path is both a blob and a tree: {}",
                        dir.display()
                    )));
                }
                None => {
                    let node_mode = if dir == path { mode } else { DEFAULT_DIR_MODE };
                    self.link(dir, FileType::Directory);
                    self.nodes.insert(dir.to_path_buf(), Node::tree(node_mode));
                }
            }
        }
        Ok(())
    }

    /// Register `path` in its parent's child set.
    fn link(&mut self, path: &Path, file_type: FileType) {
        let Some(parent) = path.parent() else {
            return;
        };
        if let Some(Node {
            kind: NodeKind::Tree(children),
            ..
        }) = self.nodes.get_mut(parent)
        {
            children.insert(paths::file_name(path), file_type);
        }
    }

    fn node(&self, path: &Path) -> Option<&Node> {
        self.nodes.get(&paths::normalize(path))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.node(path).is_some()
    }

    pub fn is_blob(&self, path: &Path) -> bool {
        self.node(path)
            .is_some_and(|n| matches!(n.kind, NodeKind::Blob(_)))
    }

    /// Stats for `path`, or `None` if it isn't in the tree.
    ///
    /// Directories and blobs report the epoch as their times; blob size is
    /// unknown until the content has been fetched.
    pub async fn stat_entry(&self, path: &Path) -> Option<FileStats> {
        let node = self.node(path)?;
        Some(match &node.kind {
            NodeKind::Tree(_) => FileStats::directory(node.mode, UNIX_EPOCH),
            NodeKind::Blob(content) => {
                let size = match &*content.read().await {
                    BlobContent::Raw(bytes) => Some(bytes.len() as u64),
                    BlobContent::Unloaded { .. } => None,
                };
                FileStats::file(size, node.mode, UNIX_EPOCH)
            }
        })
    }

    /// True once the blob at `path` has been fetched.
    pub async fn is_loaded(&self, path: &Path) -> bool {
        match self.node(path).map(|n| &n.kind) {
            Some(NodeKind::Blob(content)) => {
                matches!(&*content.read().await, BlobContent::Raw(_))
            }
            _ => false,
        }
    }

    /// Names and types of the children of a directory.
    pub fn children(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        match self.node(path).map(|n| &n.kind) {
            Some(NodeKind::Tree(children)) => Ok(children
                .iter()
                .map(|(name, file_type)| DirEntry {
                    name: name.clone(),
                    file_type: *file_type,
                })
                .collect()),
            Some(NodeKind::Blob(_)) => Err(FsError::not_a_directory(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    /// Every blob at or beneath `path`, sorted.
    pub fn blobs_under(&self, path: &Path) -> Vec<PathBuf> {
        let root = paths::normalize(path);
        let mut blobs = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            match self.nodes.get(&current).map(|n| &n.kind) {
                Some(NodeKind::Blob(_)) => blobs.push(current),
                Some(NodeKind::Tree(children)) => {
                    stack.extend(children.keys().map(|name| current.join(name)));
                }
                None => {}
            }
        }
        blobs.sort();
        blobs
    }

    /// Mount paths of every blob in the tree, sorted.
    pub fn blob_paths(&self) -> Vec<PathBuf> {
        self.blobs_under(Path::new("/"))
    }

    /// Contents of the blob at `path`, fetching and caching on first use.
    ///
    /// A failed fetch leaves the blob unloaded, so the next read retries.
    pub async fn read_blob(&self, path: &Path) -> FsResult<Arc<Vec<u8>>> {
        let node = self.node(path).ok_or_else(|| FsError::not_found(path))?;
        let NodeKind::Blob(content) = &node.kind else {
            return Err(FsError::is_a_directory(path));
        };

        let source_path = match &*content.read().await {
            BlobContent::Raw(bytes) => return Ok(bytes.clone()),
            BlobContent::Unloaded { source_path } => source_path.clone(),
        };

        // The lock is not held across the fetch; a concurrent reader of the
        // same blob may fetch it too, and the first result wins.
        tracing::debug!(path = %path.display(), source = %source_path, "hydrating blob");
        let fetched = Arc::new(self.provider.get_content(&source_path).await?);

        let mut slot = content.write().await;
        match &*slot {
            BlobContent::Raw(bytes) => Ok(bytes.clone()),
            BlobContent::Unloaded { .. } => {
                *slot = BlobContent::Raw(fetched.clone());
                Ok(fetched)
            }
        }
    }
}

#[async_trait]
impl Filesystem for ContentTree {
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        Ok(self.read_blob(path).await?.as_ref().clone())
    }

    async fn write(&self, path: &Path, _data: &[u8]) -> FsResult<()> {
        Err(FsError::permission_denied(path))
    }

    async fn list(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.children(path)
    }

    async fn stat(&self, path: &Path) -> FsResult<FileStats> {
        self.stat_entry(path)
            .await
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn mkdir(&self, path: &Path) -> FsResult<()> {
        Err(FsError::permission_denied(path))
    }

    async fn remove(&self, path: &Path) -> FsResult<()> {
        Err(FsError::permission_denied(path))
    }

    async fn rename(&self, from: &Path, _to: &Path) -> FsResult<()> {
        Err(FsError::permission_denied(from))
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }
}
