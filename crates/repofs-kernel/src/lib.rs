//! repofs-kernel: an editable view of a read-only remote repository snapshot.
//!
//! This crate provides:
//!
//! - **ContentTree**: the immutable tree built from a remote manifest, with
//!   blob content fetched lazily from a [`ContentProvider`] and cached
//! - **MemoryFs**: the writable layer every local mutation lands in
//! - **TombstoneLog**: the append-only deletion ledger stored in the writable layer
//! - **OverlayFs**: the union of the three, with POSIX-like path semantics
//! - **SourceControl**: created/modified/deleted status computed from local state
//! - **WorkspaceFs**: the narrow facade the rest of an application talks to
//!
//! [`Workspace`] wires all of them together from a manifest and a provider.

pub mod config;
pub mod paths;
pub mod scm;
pub mod testing;
pub mod vfs;
pub mod workspace;

pub use config::{MissingContent, OverlayConfig};
pub use scm::{BlobLister, CachedBlobLister, ModifiedTimeSource, SourceControl, SourceControlFs};
pub use vfs::{
    ContentProvider, ContentTree, EmptyOnNotFound, Filesystem, LocalContentProvider, MemoryFs,
    OpenFlags, OverlayFile, OverlayFs, ParsedFileCache, TombstoneContents, TombstoneKind,
    TombstoneLog, TombstoneReader,
};
pub use workspace::{RmOptions, Workspace, WorkspaceFs};

pub use repofs_types::{
    ContentError, DirEntry, FileStats, FileStatus, FileType, Fingerprint, FsError, FsResult,
    Manifest, ManifestEntry,
};
