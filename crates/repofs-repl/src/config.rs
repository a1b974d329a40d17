//! Configuration for the repofs shell.
//!
//! Loaded from `~/.config/repofs/config.toml` when present:
//!
//! ```toml
//! [snapshot]
//! dir = "/home/amy/src/project"
//! repo_root = "/repo"
//!
//! [overlay]
//! tombstone_path = "/.deleted_files.log"
//! missing_content = "empty"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use repofs_kernel::OverlayConfig;

/// Where the remote snapshot comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Local directory serving blob content.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// JSON manifest to use instead of walking `dir`.
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    /// Mount point of the repository.
    #[serde(default = "default_repo_root")]
    pub repo_root: String,
}

fn default_repo_root() -> String {
    "/repo".to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: None,
            manifest: None,
            repo_root: default_repo_root(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,
}

impl ReplConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Default config file path, if the platform has a config directory.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "repofs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// History file path, if the platform has a data directory.
    pub fn history_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "repofs").map(|dirs| dirs.data_dir().join("history.txt"))
    }
}
