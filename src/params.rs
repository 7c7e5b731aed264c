//! Publish session configuration.
//!
//! Owned by the caller and handed to the mediator at construction. All
//! fields carry serde defaults so parameter files only need to state what
//! they change.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Requested action for the virtual catalog under the reserved namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualCatalogAction {
    #[default]
    None,
    Generate,
    Remove,
}

/// Session configuration for one publish run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncParameters {
    /// Report and count changes without touching catalog or content store.
    #[serde(default)]
    pub dry_run: bool,

    /// Emit one changeset line per mutation instead of progress dots.
    #[serde(default)]
    pub print_changeset: bool,

    /// Capture extended attributes into catalog entries.
    #[serde(default)]
    pub include_xattrs: bool,

    /// Skip device nodes, fifos and sockets with a warning instead of
    /// publishing them.
    #[serde(default)]
    pub ignore_special_files: bool,

    /// Tolerate hardlink groups whose member count disagrees with the
    /// on-disk link count (hardlinks spanning directories).
    #[serde(default)]
    pub ignore_xdir_hardlinks: bool,

    /// The caller assigns the revision number instead of the catalog.
    #[serde(default)]
    pub manual_revision: bool,

    /// Pause the catalog commit for manual review between phases.
    #[serde(default)]
    pub stop_for_catalog_tweaks: bool,

    #[serde(default)]
    pub virtual_catalog_action: VirtualCatalogAction,

    /// Scratch space for temporary objects (e.g. the zero-byte catalog
    /// marker uploaded during commit).
    #[serde(default = "default_dir_temp")]
    pub dir_temp: PathBuf,
}

fn default_dir_temp() -> PathBuf {
    std::env::temp_dir()
}

impl Default for SyncParameters {
    fn default() -> Self {
        Self {
            dry_run: false,
            print_changeset: false,
            include_xattrs: false,
            ignore_special_files: false,
            ignore_xdir_hardlinks: false,
            manual_revision: false,
            stop_for_catalog_tweaks: false,
            virtual_catalog_action: VirtualCatalogAction::None,
            dir_temp: default_dir_temp(),
        }
    }
}

impl SyncParameters {
    /// Load parameters from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
