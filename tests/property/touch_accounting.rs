//! Property-based test for the touch statistics reconciliation.
//!
//! Touching a file must always net out to exactly one "changed" item with
//! the size difference attributed to added or removed bytes, never both.

use lamina::catalog::{CatalogManager, DirectoryEntry, FileChunk, Manifest};
use lamina::error::CatalogError;
use lamina::hash::ContentHash;
use lamina::item::{ItemKind, SyncItem, XattrList};
use lamina::mediator::SyncMediator;
use lamina::params::SyncParameters;
use lamina::spooler::{Spooler, UploadListener};
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Catalog sink for dry runs; every mutation is a protocol violation.
struct NullCatalog;

impl CatalogManager for NullCatalog {
    fn add_file(
        &self,
        _entry: DirectoryEntry,
        _xattrs: &XattrList,
        _parent: &Path,
    ) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn add_chunked_file(
        &self,
        _entry: DirectoryEntry,
        _xattrs: &XattrList,
        _parent: &Path,
        _chunks: &[FileChunk],
    ) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn add_directory(
        &self,
        _entry: DirectoryEntry,
        _xattrs: &XattrList,
        _parent: &Path,
    ) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn add_hardlink_group(
        &self,
        _entries: Vec<DirectoryEntry>,
        _xattrs: &XattrList,
        _parent: &Path,
        _chunks: &[FileChunk],
    ) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn remove_file(&self, _path: &Path) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn remove_directory(&self, _path: &Path) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn touch_directory(
        &self,
        _entry: DirectoryEntry,
        _xattrs: &XattrList,
        _path: &Path,
    ) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn shrink_hardlink_group(&self, _path: &Path) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn create_nested_catalog(&self, _path: &Path) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn remove_nested_catalog(&self, _path: &Path) -> Result<(), CatalogError> {
        panic!("catalog mutated during dry run");
    }

    fn is_transition_point(&self, _path: &Path) -> bool {
        false
    }

    fn is_balanceable(&self) -> bool {
        false
    }

    fn balance(&self) -> Result<(), CatalogError> {
        Ok(())
    }

    fn precalculate_listings(&self) -> Result<(), CatalogError> {
        Ok(())
    }

    fn commit(
        &self,
        _stop_for_tweaks: bool,
        _manual_revision: bool,
    ) -> Result<Manifest, CatalogError> {
        Ok(Manifest {
            root_hash: ContentHash::of_bytes(b""),
            revision: 0,
            catalog_size: 0,
        })
    }

    fn clone_tree(&self, _from: &Path, _to: &Path) -> Result<(), CatalogError> {
        Ok(())
    }
}

struct NullSpooler;

impl Spooler for NullSpooler {
    fn process(&self, _source: &Path) {
        panic!("content spooled during dry run");
    }

    fn register_listener(&self, _listener: UploadListener) {}

    fn unregister_listeners(&self) {}

    fn wait_for_upload(&self) {}

    fn num_errors(&self) -> u64 {
        0
    }
}

fn dry_run_mediator() -> SyncMediator {
    let params = SyncParameters {
        dry_run: true,
        ..Default::default()
    };
    SyncMediator::new(Arc::new(NullCatalog), Arc::new(NullSpooler), params)
}

fn touched_file(old_size: u64, new_size: u64) -> SyncItem {
    SyncItem::new("data", "f.bin", Some(ItemKind::File), Some(ItemKind::File))
        .with_sizes(old_size, new_size)
        .with_paths("/union/data/f.bin", "/rdonly/data/f.bin", "/scratch/data/f.bin")
}

proptest! {
    #[test]
    fn touch_attributes_exact_byte_delta(old_size in 0u64..1_000_000, new_size in 0u64..1_000_000) {
        let mut mediator = dry_run_mediator();
        mediator.touch(touched_file(old_size, new_size)).unwrap();

        let snap = mediator.counters().snapshot();
        prop_assert_eq!(snap.n_files_changed, 1);
        prop_assert_eq!(snap.n_files_added, 0);
        prop_assert_eq!(snap.n_files_removed, 0);
        prop_assert_eq!(snap.n_symlinks_changed, 0);

        let delta = new_size as i64 - old_size as i64;
        prop_assert_eq!(snap.sz_added_bytes, delta.max(0));
        prop_assert_eq!(snap.sz_removed_bytes, (-delta).max(0));
    }

    #[test]
    fn repeated_touches_accumulate_changes(rounds in 1usize..20) {
        let mut mediator = dry_run_mediator();
        for _ in 0..rounds {
            mediator.touch(touched_file(10, 10)).unwrap();
        }

        let snap = mediator.counters().snapshot();
        prop_assert_eq!(snap.n_files_changed, rounds as i64);
        prop_assert_eq!(snap.sz_added_bytes, 0);
        prop_assert_eq!(snap.sz_removed_bytes, 0);
    }
}
