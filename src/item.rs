//! Two-state view of a single path in the overlay change set.
//!
//! A [`SyncItem`] compares one relative path across the base (read-only)
//! layer and the overlay (scratch) layer. Items are produced by the union
//! engine while the change set is traversed; the mediator only queries and
//! annotates them.

use crate::catalog::DirectoryEntry;
use crate::hash::{Compression, ContentHash};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reserved metadata namespace at the repository root. Entries inside it are
/// generated by the virtual catalog machinery and must never appear in a
/// change set.
pub const RESERVED_NAMESPACE: &str = ".lamina";

/// Bundle specification file, only valid directly at the repository root.
pub const BUNDLE_SPEC_NAME: &str = ".laminabundles";

/// Marker file that makes its directory a nested catalog transition point.
pub const CATALOG_MARKER_NAME: &str = ".laminacatalog";

/// Prefix of graft sidecar files carrying precomputed hash/chunk metadata.
pub const GRAFT_MARKER_PREFIX: &str = ".laminagraft-";

/// Extended attributes captured from the union layer at item creation.
pub type XattrList = BTreeMap<String, Vec<u8>>;

/// Entry kind of one side (base or overlay) of a [`SyncItem`].
///
/// Reserved-name kinds (`GraftMarker`, `CatalogMarker`, `BundleSpec`) are
/// assigned by [`ItemKind::classify`] only when the underlying filesystem
/// object is a regular file; anything else keeps its raw kind so policy
/// checks can reject e.g. a symlink carrying the bundle-spec name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Directory,
    File,
    Symlink,
    CharDev,
    BlockDev,
    Fifo,
    Socket,
    Whiteout,
    GraftMarker,
    CatalogMarker,
    BundleSpec,
    Unknown,
}

impl ItemKind {
    /// Upgrade a raw filesystem kind to a reserved-name kind where one
    /// applies.
    pub fn classify(name: &str, raw: ItemKind) -> ItemKind {
        if raw != ItemKind::File {
            return raw;
        }
        if name == BUNDLE_SPEC_NAME {
            ItemKind::BundleSpec
        } else if name == CATALOG_MARKER_NAME {
            ItemKind::CatalogMarker
        } else if name.starts_with(GRAFT_MARKER_PREFIX) {
            ItemKind::GraftMarker
        } else {
            raw
        }
    }

    pub fn is_special(self) -> bool {
        matches!(
            self,
            ItemKind::CharDev | ItemKind::BlockDev | ItemKind::Fifo | ItemKind::Socket
        )
    }
}

/// Precomputed content metadata supplied by a graft sidecar, sparing the
/// publish from re-reading the file's bytes.
#[derive(Debug, Clone)]
pub struct GraftInfo {
    pub content_hash: ContentHash,
    pub size: u64,
    pub chunks: Option<Vec<crate::catalog::FileChunk>>,
}

/// Grafting state of an entry. `Invalid` marks a sidecar that was present
/// but missing required hash/chunk metadata.
#[derive(Debug, Clone, Default)]
pub enum GraftState {
    #[default]
    None,
    Valid(GraftInfo),
    Invalid,
}

/// True if `relative_path` is the reserved metadata namespace or nested
/// under it.
pub fn in_reserved_namespace(relative_path: &Path) -> bool {
    relative_path == Path::new(RESERVED_NAMESPACE)
        || relative_path.starts_with(Path::new(RESERVED_NAMESPACE))
}

/// A fully resolved view of one path across the base and overlay trees.
#[derive(Debug, Clone)]
pub struct SyncItem {
    relative_parent: PathBuf,
    name: String,
    old_kind: Option<ItemKind>,
    new_kind: Option<ItemKind>,
    rdonly_size: u64,
    scratch_size: u64,
    union_path: PathBuf,
    rdonly_path: PathBuf,
    scratch_path: PathBuf,
    inode: u64,
    link_count: u64,
    rdonly_link_count: u64,
    content_hash: Option<ContentHash>,
    compression: Compression,
    xattrs: XattrList,
    graft: GraftState,
    symlink_target: Option<String>,
    has_catalog_marker: bool,
}

impl SyncItem {
    /// Create an item for `name` under `relative_parent` (empty for the
    /// repository root). `old_kind`/`new_kind` are the classified kinds in
    /// the base and overlay layers; `None` means absent in that layer.
    pub fn new(
        relative_parent: impl Into<PathBuf>,
        name: impl Into<String>,
        old_kind: Option<ItemKind>,
        new_kind: Option<ItemKind>,
    ) -> Self {
        Self {
            relative_parent: relative_parent.into(),
            name: name.into(),
            old_kind,
            new_kind,
            rdonly_size: 0,
            scratch_size: 0,
            union_path: PathBuf::new(),
            rdonly_path: PathBuf::new(),
            scratch_path: PathBuf::new(),
            inode: 0,
            link_count: 1,
            rdonly_link_count: 1,
            content_hash: None,
            compression: Compression::default(),
            xattrs: XattrList::new(),
            graft: GraftState::None,
            symlink_target: None,
            has_catalog_marker: false,
        }
    }

    pub fn with_sizes(mut self, rdonly: u64, scratch: u64) -> Self {
        self.rdonly_size = rdonly;
        self.scratch_size = scratch;
        self
    }

    pub fn with_paths(
        mut self,
        union_path: impl Into<PathBuf>,
        rdonly_path: impl Into<PathBuf>,
        scratch_path: impl Into<PathBuf>,
    ) -> Self {
        self.union_path = union_path.into();
        self.rdonly_path = rdonly_path.into();
        self.scratch_path = scratch_path.into();
        self
    }

    pub fn with_inode(mut self, inode: u64, link_count: u64) -> Self {
        self.inode = inode;
        self.link_count = link_count;
        self
    }

    pub fn with_rdonly_link_count(mut self, link_count: u64) -> Self {
        self.rdonly_link_count = link_count;
        self
    }

    pub fn with_xattrs(mut self, xattrs: XattrList) -> Self {
        self.xattrs = xattrs;
        self
    }

    pub fn with_graft(mut self, graft: GraftState) -> Self {
        self.graft = graft;
        self
    }

    pub fn with_symlink_target(mut self, target: impl Into<String>) -> Self {
        self.symlink_target = Some(target.into());
        self
    }

    pub fn with_catalog_marker(mut self, present: bool) -> Self {
        self.has_catalog_marker = present;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relative_parent(&self) -> &Path {
        &self.relative_parent
    }

    /// Path relative to the repository root.
    pub fn relative_path(&self) -> PathBuf {
        self.relative_parent.join(&self.name)
    }

    pub fn union_path(&self) -> &Path {
        &self.union_path
    }

    pub fn rdonly_path(&self) -> &Path {
        &self.rdonly_path
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    pub fn old_kind(&self) -> Option<ItemKind> {
        self.old_kind
    }

    pub fn new_kind(&self) -> Option<ItemKind> {
        self.new_kind
    }

    pub fn rdonly_size(&self) -> u64 {
        self.rdonly_size
    }

    pub fn scratch_size(&self) -> u64 {
        self.scratch_size
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn link_count(&self) -> u64 {
        self.link_count
    }

    pub fn rdonly_link_count(&self) -> u64 {
        self.rdonly_link_count
    }

    pub fn xattrs(&self) -> &XattrList {
        &self.xattrs
    }

    pub fn graft(&self) -> &GraftState {
        &self.graft
    }

    pub fn content_hash(&self) -> Option<ContentHash> {
        self.content_hash
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn set_content_hash(&mut self, hash: ContentHash) {
        self.content_hash = Some(hash);
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Absent in the base layer, i.e. a pure addition.
    pub fn is_new(&self) -> bool {
        self.old_kind.is_none()
    }

    pub fn is_directory(&self) -> bool {
        self.new_kind == Some(ItemKind::Directory)
    }

    pub fn was_directory(&self) -> bool {
        self.old_kind == Some(ItemKind::Directory)
    }

    pub fn is_regular_file(&self) -> bool {
        matches!(
            self.new_kind,
            Some(ItemKind::File | ItemKind::CatalogMarker | ItemKind::BundleSpec)
        )
    }

    pub fn was_regular_file(&self) -> bool {
        matches!(
            self.old_kind,
            Some(ItemKind::File | ItemKind::CatalogMarker | ItemKind::BundleSpec)
        )
    }

    pub fn is_symlink(&self) -> bool {
        self.new_kind == Some(ItemKind::Symlink)
    }

    pub fn was_symlink(&self) -> bool {
        self.old_kind == Some(ItemKind::Symlink)
    }

    pub fn is_special_file(&self) -> bool {
        self.new_kind.map_or(false, ItemKind::is_special)
    }

    pub fn was_special_file(&self) -> bool {
        self.old_kind.map_or(false, ItemKind::is_special)
    }

    pub fn is_whiteout(&self) -> bool {
        self.new_kind == Some(ItemKind::Whiteout)
    }

    pub fn is_graft_marker(&self) -> bool {
        self.new_kind == Some(ItemKind::GraftMarker)
    }

    pub fn is_catalog_marker(&self) -> bool {
        self.new_kind == Some(ItemKind::CatalogMarker)
    }

    pub fn is_bundle_spec(&self) -> bool {
        self.new_kind == Some(ItemKind::BundleSpec)
    }

    pub fn was_bundle_spec(&self) -> bool {
        self.old_kind == Some(ItemKind::BundleSpec)
    }

    /// The directory (new state) contains a catalog boundary marker.
    pub fn has_catalog_marker(&self) -> bool {
        self.has_catalog_marker
    }

    pub fn has_hardlinks(&self) -> bool {
        self.link_count > 1
    }

    pub fn has_graft(&self) -> bool {
        !matches!(self.graft, GraftState::None)
    }

    /// Render the basic catalog directory entry for the item's new state.
    pub fn catalog_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            name: self.name.clone(),
            kind: self.new_kind.unwrap_or(ItemKind::Unknown),
            size: self.scratch_size,
            inode: self.inode,
            link_count: self.link_count,
            hash: self.content_hash,
            compression: self.compression,
            symlink_target: self.symlink_target.clone(),
        }
    }
}
