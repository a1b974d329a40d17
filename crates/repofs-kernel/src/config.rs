//! Overlay configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default location of the deletion ledger inside the writable layer.
pub const DEFAULT_TOMBSTONE_PATH: &str = "/.deleted_files.log";

/// What a read does when the content provider reports a blob as missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingContent {
    /// Surface the provider's NotFound to the caller.
    #[default]
    Error,
    /// Treat the blob as empty.
    Empty,
}

/// Configuration for an overlay workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Backing path of the tombstone log in the writable layer. Protected:
    /// no user operation may address it.
    pub tombstone_path: PathBuf,
    pub missing_content: MissingContent,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tombstone_path: PathBuf::from(DEFAULT_TOMBSTONE_PATH),
            missing_content: MissingContent::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OverlayConfig::default();
        assert_eq!(config.tombstone_path, PathBuf::from("/.deleted_files.log"));
        assert_eq!(config.missing_content, MissingContent::Error);
    }
}
