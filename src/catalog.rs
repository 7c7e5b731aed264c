//! Catalog storage engine boundary.
//!
//! The hash-tree-backed catalog that persists directory metadata is an
//! external collaborator. The mediator talks to it exclusively through
//! [`CatalogManager`]; how entries are serialized and how the hash tree is
//! computed is the backend's business.

use crate::error::CatalogError;
use crate::hash::{Compression, ContentHash};
use crate::item::{ItemKind, XattrList};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Basic catalog directory entry, the unit of catalog mutation.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: ItemKind,
    pub size: u64,
    pub inode: u64,
    pub link_count: u64,
    pub hash: Option<ContentHash>,
    pub compression: Compression,
    pub symlink_target: Option<String>,
}

/// One piece of a chunked file in the content-addressed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub offset: u64,
    pub size: u64,
    pub hash: ContentHash,
}

/// Top-level published descriptor referencing the root catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub root_hash: ContentHash,
    pub revision: u64,
    pub catalog_size: u64,
}

/// Writable catalog manager consumed by the sync mediator.
///
/// Mutations may arrive from the walk thread and from upload-completion
/// threads; implementations must serialize access internally.
pub trait CatalogManager: Send + Sync {
    fn add_file(
        &self,
        entry: DirectoryEntry,
        xattrs: &XattrList,
        parent: &Path,
    ) -> Result<(), CatalogError>;

    fn add_chunked_file(
        &self,
        entry: DirectoryEntry,
        xattrs: &XattrList,
        parent: &Path,
        chunks: &[FileChunk],
    ) -> Result<(), CatalogError>;

    fn add_directory(
        &self,
        entry: DirectoryEntry,
        xattrs: &XattrList,
        parent: &Path,
    ) -> Result<(), CatalogError>;

    /// Add a complete hardlink group: every member entry plus the shared
    /// chunk list (empty for whole-file uploads and symlink groups).
    fn add_hardlink_group(
        &self,
        entries: Vec<DirectoryEntry>,
        xattrs: &XattrList,
        parent: &Path,
        chunks: &[FileChunk],
    ) -> Result<(), CatalogError>;

    fn remove_file(&self, path: &Path) -> Result<(), CatalogError>;

    fn remove_directory(&self, path: &Path) -> Result<(), CatalogError>;

    fn touch_directory(
        &self,
        entry: DirectoryEntry,
        xattrs: &XattrList,
        path: &Path,
    ) -> Result<(), CatalogError>;

    /// Detach one member from its on-catalog hardlink group before removal.
    fn shrink_hardlink_group(&self, path: &Path) -> Result<(), CatalogError>;

    fn create_nested_catalog(&self, path: &Path) -> Result<(), CatalogError>;

    fn remove_nested_catalog(&self, path: &Path) -> Result<(), CatalogError>;

    /// Whether `path` is already a nested catalog transition point.
    fn is_transition_point(&self, path: &Path) -> bool;

    /// Whether the catalog tree is due for structural rebalancing.
    fn is_balanceable(&self) -> bool;

    fn balance(&self) -> Result<(), CatalogError>;

    /// Precompute directory listings ahead of the final commit.
    fn precalculate_listings(&self) -> Result<(), CatalogError>;

    /// Finalize the catalog, producing the published manifest. May pause for
    /// review between phases when `stop_for_tweaks` is set.
    fn commit(&self, stop_for_tweaks: bool, manual_revision: bool)
        -> Result<Manifest, CatalogError>;

    /// Duplicate the subtree at `from` under `to`.
    fn clone_tree(&self, from: &Path, to: &Path) -> Result<(), CatalogError>;
}
