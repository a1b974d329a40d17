//! Source control over the overlay.
//!
//! Everything here is computed from local state: the writable layer, the
//! tombstone log and the already-known remote tree. Nothing re-queries the
//! remote for a listing.
//!
//! - [`SourceControl`]: created / modified / deleted status
//! - [`BlobLister`] and [`CachedBlobLister`]: the flat set of all blob paths
//! - [`SourceControlFs`]: current and original views of a path, for diffs

mod blobs;
mod reader;
mod status;

pub use blobs::{BlobLister, CachedBlobLister, ModifiedTimeSource};
pub use reader::SourceControlFs;
pub use status::SourceControl;
