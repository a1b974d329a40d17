//! Source-control status entries.

/// One changed path, relative to the repository root (`/README.md`).
///
/// Produced fresh by each status query; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Created { path: String, content: Vec<u8> },
    Modified { path: String, content: Vec<u8> },
    Deleted { path: String },
}

impl FileStatus {
    pub fn path(&self) -> &str {
        match self {
            FileStatus::Created { path, .. }
            | FileStatus::Modified { path, .. }
            | FileStatus::Deleted { path } => path,
        }
    }

    /// Current content, absent for deletions.
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            FileStatus::Created { content, .. } | FileStatus::Modified { content, .. } => {
                Some(content)
            }
            FileStatus::Deleted { .. } => None,
        }
    }

    /// Single-letter code in the style of `git status --short`.
    pub fn code(&self) -> char {
        match self {
            FileStatus::Created { .. } => 'A',
            FileStatus::Modified { .. } => 'M',
            FileStatus::Deleted { .. } => 'D',
        }
    }
}
