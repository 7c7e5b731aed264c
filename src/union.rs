//! Union/overlay engine boundary.
//!
//! The overlay filesystem that captures changes on top of the read-only
//! base is an external collaborator. It resolves a path across both layers
//! into a [`SyncItem`] (stat, whiteout detection, xattr capture, graft
//! sidecar parsing) and decides which entries are synthetic and must be
//! skipped during traversal.

use crate::error::PublishError;
use crate::item::{ItemKind, SyncItem};
use std::path::Path;

/// Overlay engine consumed by the sync mediator.
pub trait UnionEngine: Send + Sync {
    /// Root of the writable layer capturing new and changed content.
    fn scratch_path(&self) -> &Path;

    /// Root of the read-only base layer, the state as last published.
    fn rdonly_path(&self) -> &Path;

    /// Root of the merged view presented by the union mount.
    fn union_path(&self) -> &Path;

    /// Whether the overlay implementation preserves hardlink identity.
    /// Hardlink aggregation is disabled entirely when it does not.
    fn supports_hardlinks(&self) -> bool;

    /// Resolve `name` under `relative_parent` across both layers.
    /// `kind_hint` is the kind observed by the traversal; the engine may
    /// refine it (e.g. whiteout detection, reserved-name classification).
    fn create_item(
        &self,
        relative_parent: &Path,
        name: &str,
        kind_hint: ItemKind,
    ) -> Result<SyncItem, PublishError>;

    /// Entries the overlay engine marks as synthetic (e.g. whiteout
    /// sentinels already handled elsewhere) are skipped during traversal.
    fn ignore_file(&self, relative_parent: &Path, name: &str) -> bool;

    /// Invoked once after all content uploads have finished, for any
    /// post-publish cleanup the overlay needs to perform.
    fn post_upload(&self) {}
}
