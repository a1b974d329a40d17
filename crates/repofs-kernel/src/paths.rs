//! POSIX-style path helpers.
//!
//! Every path inside the kernel is absolute and `/`-separated. Keys in the
//! layers are always produced by [`normalize`], so `"/a/b/"`, `"a/./b"` and
//! `"/a/c/../b"` all address the same entry.

use std::path::{Component, Path, PathBuf};

/// Make a path absolute and resolve `.` and `..` without touching any store.
///
/// `..` at the root stays at the root. Trailing separators are dropped.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut result = PathBuf::from("/");
    for component in path.as_ref().components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(s) => result.push(s),
        }
    }
    result
}

pub fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

/// Mount a repository-relative path (`foo/bar.js` or `/foo/bar.js`) under `root`.
pub fn mount(root: &Path, relative: &str) -> PathBuf {
    normalize(root.join(relative.trim_start_matches('/')))
}

/// Repository-relative form of a mount path, with a leading `/`.
///
/// Returns `None` when `path` is not under `root`.
pub fn repo_relative(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    Some(format!("/{}", rest.to_string_lossy()))
}

/// Final component as a string (empty for the root).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strict ancestors of `path`, nearest first, ending at `/`.
pub fn ancestors(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors().skip(1)
}

/// True if `path` is `dir` itself or anywhere beneath it.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}
