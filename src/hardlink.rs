//! Hardlink group bookkeeping.
//!
//! All entries in one directory sharing an inode are merged into a single
//! group. The mediator keeps one [`HardlinkGroupMap`] per directory nesting
//! level; the stack of maps mirrors the recursion depth of the walk.

use crate::catalog::FileChunk;
use crate::item::SyncItem;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// One master item plus every sibling sharing its inode, keyed by union
/// path. The master is included in the member map, matching what the
/// catalog expects from a full group replacement.
#[derive(Debug, Clone)]
pub struct HardlinkGroup {
    pub master: SyncItem,
    pub members: BTreeMap<PathBuf, SyncItem>,
    /// Chunk list of the shared content, filled in once the deferred upload
    /// completes. Empty for whole-file uploads and symlink groups.
    pub chunks: Vec<FileChunk>,
}

impl HardlinkGroup {
    pub fn new(master: SyncItem) -> Self {
        let mut members = BTreeMap::new();
        members.insert(master.union_path().to_path_buf(), master.clone());
        Self {
            master,
            members,
            chunks: Vec::new(),
        }
    }

    pub fn add_member(&mut self, item: SyncItem) {
        self.members.insert(item.union_path().to_path_buf(), item);
    }

    pub fn contains(&self, union_path: &std::path::Path) -> bool {
        self.members.contains_key(union_path)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Inode to group map for a single directory scope.
pub type HardlinkGroupMap = HashMap<u64, HardlinkGroup>;
