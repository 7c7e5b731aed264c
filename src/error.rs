//! Error types for the publish reconciliation engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while folding an overlay change set into the catalog.
///
/// Policy violations (reserved paths, malformed bundle specs, invalid graft
/// metadata, root-level boundary markers, disallowed cross-directory
/// hardlinks) abort the whole publish when propagated. `UploadErrors` is the
/// clean commit-failure result checked at the commit barriers.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid attempt to modify reserved path {0:?}")]
    ReservedPath(PathBuf),

    #[error("bundle specification rejected: {0}")]
    BundleSpec(String),

    #[error("grafted file {0:?} carries invalid grafting information")]
    InvalidGraft(PathBuf),

    #[error("nested catalog marker in root directory")]
    CatalogMarkerAtRoot,

    #[error("hardlinks across directories ({0:?})")]
    CrossDirectoryHardlinks(PathBuf),

    #[error("illegal directory name {0:?}: reserved for bundle specification files")]
    ReservedDirectoryName(PathBuf),

    #[error("content store reported {count} failed uploads")]
    UploadErrors { count: u64 },

    #[error("catalog operation failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by catalog storage backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("entry not found: {0:?}")]
    EntryNotFound(PathBuf),

    #[error("catalog backend error: {0}")]
    Backend(String),

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
}
