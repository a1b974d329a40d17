//! Filesystem layers for repofs.
//!
//! The overlay composes three stores into one namespace:
//!
//! ```text
//! OverlayFs
//! ├── MemoryFs       # writable layer, wins every lookup
//! ├── TombstoneLog   # deletion ledger, a record file inside MemoryFs
//! └── ContentTree    # immutable remote tree, blobs hydrated on first read
//! ```
//!
//! Lookups consult the writable layer first, then the tombstone log, then
//! the content tree. Mutations only ever touch the writable layer and the log.

mod content_tree;
mod file;
mod flags;
mod local;
mod memory;
mod overlay;
mod parsed_file;
mod provider;
mod tombstone;
mod traits;

pub use content_tree::ContentTree;
pub use file::OverlayFile;
pub use flags::{ExistsAction, MissingAction, OpenFlags};
pub use local::LocalContentProvider;
pub use memory::MemoryFs;
pub use overlay::OverlayFs;
pub use parsed_file::ParsedFileCache;
pub use provider::{ContentProvider, EmptyOnNotFound};
pub use tombstone::{TombstoneContents, TombstoneKind, TombstoneLog, TombstoneReader};
pub use traits::Filesystem;
