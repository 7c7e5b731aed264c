//! The sync mediator: folds an overlay change set into the catalog.
//!
//! The external walker drives `add`/`touch`/`remove` for every discovered
//! path and `enter_directory`/`leave_directory` at directory boundaries.
//! The mediator issues catalog mutations synchronously, hands file content
//! to the spooler asynchronously, reconciles hardlink groups per directory
//! scope, and finalizes everything in a single terminal `commit`.

use crate::catalog::{CatalogManager, DirectoryEntry, Manifest};
use crate::error::PublishError;
use crate::hardlink::{HardlinkGroup, HardlinkGroupMap};
use crate::item::{
    in_reserved_namespace, GraftState, ItemKind, SyncItem, XattrList, BUNDLE_SPEC_NAME,
};
use crate::params::{SyncParameters, VirtualCatalogAction};
use crate::reporter::{ChangeReporter, ReportMode};
use crate::spooler::{Spooler, SpoolerResult};
use crate::stats::{self, FsCounters};
use crate::union::UnionEngine;
use crate::walk::{FsTraversal, TreeVisitor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State shared between the walk thread and the spooler's completion
/// threads. Locks are held only for the lookup/insert/remove itself, never
/// across catalog mutation.
struct UploadState {
    /// Upload source path to the item awaiting its content hash.
    file_queue: Mutex<HashMap<PathBuf, SyncItem>>,
    /// Plain-file hardlink groups whose shared content upload is deferred
    /// to the end of the walk.
    hardlink_queue: Mutex<Vec<HardlinkGroup>>,
    catalog: Arc<dyn CatalogManager>,
    include_xattrs: bool,
}

/// Orchestrates one publish session.
pub struct SyncMediator {
    catalog: Arc<dyn CatalogManager>,
    spooler: Arc<dyn Spooler>,
    union: Option<Arc<dyn UnionEngine>>,
    params: SyncParameters,
    handle_hardlinks: bool,
    hardlink_stack: Vec<HardlinkGroupMap>,
    uploads: Arc<UploadState>,
    counters: Arc<FsCounters>,
    reporter: ChangeReporter,
}

impl SyncMediator {
    /// Create a mediator and register its upload-completion listener with
    /// the spooler.
    pub fn new(
        catalog: Arc<dyn CatalogManager>,
        spooler: Arc<dyn Spooler>,
        params: SyncParameters,
    ) -> Self {
        let mode = if params.print_changeset {
            ReportMode::Changes
        } else {
            ReportMode::Dots
        };
        let uploads = Arc::new(UploadState {
            file_queue: Mutex::new(HashMap::new()),
            hardlink_queue: Mutex::new(Vec::new()),
            catalog: catalog.clone(),
            include_xattrs: params.include_xattrs,
        });
        let listener_state = uploads.clone();
        spooler.register_listener(Arc::new(move |result| {
            publish_files_callback(&listener_state, result)
        }));

        Self {
            catalog,
            spooler,
            union: None,
            params,
            handle_hardlinks: false,
            hardlink_stack: Vec::new(),
            uploads,
            counters: Arc::new(FsCounters::new()),
            reporter: ChangeReporter::new(mode),
        }
    }

    /// Replace the reporter (e.g. to capture changeset output in tests).
    pub fn with_reporter(mut self, reporter: ChangeReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Attach the overlay engine. Hardlink aggregation is enabled iff the
    /// overlay preserves hardlink identity.
    pub fn register_union_engine(&mut self, engine: Arc<dyn UnionEngine>) {
        self.handle_hardlinks = engine.supports_hardlinks();
        self.union = Some(engine);
    }

    pub fn counters(&self) -> Arc<FsCounters> {
        self.counters.clone()
    }

    /// Duplicate the catalog subtree at `from` under `to`.
    pub fn clone_tree(&self, from: &Path, to: &Path) -> Result<(), PublishError> {
        self.catalog.clone_tree(from, to).map_err(Into::into)
    }

    /// Add an entry to the repository. Added directories are traversed so
    /// the complete subtree is added.
    pub fn add(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        self.ensure_allowed(&entry)?;

        // A non-regular object wearing the bundle-spec name never receives
        // the BundleSpec kind; reject it here (directories are caught in
        // add_directory).
        if entry.name() == BUNDLE_SPEC_NAME && !entry.is_bundle_spec() && !entry.is_directory() {
            return Err(PublishError::BundleSpec(
                "bundle specification must be a regular file".into(),
            ));
        }

        match entry.new_kind().unwrap_or(ItemKind::Unknown) {
            ItemKind::Directory => self.add_directory_recursively(entry),
            ItemKind::BundleSpec => self.add_bundle_spec(entry),
            ItemKind::File | ItemKind::Symlink | ItemKind::CatalogMarker => {
                self.add_file_or_hardlink(entry)
            }
            ItemKind::GraftMarker => {
                debug!(path = %entry.relative_path().display(), "ignoring graft marker file");
                Ok(())
            }
            ItemKind::CharDev
            | ItemKind::BlockDev
            | ItemKind::Fifo
            | ItemKind::Socket
            | ItemKind::Whiteout => {
                if self.params.ignore_special_files {
                    warn!(
                        "'{}' is a special file, ignoring",
                        entry.relative_path().display()
                    );
                    Ok(())
                } else {
                    self.add_file_or_hardlink(entry)
                }
            }
            ItemKind::Unknown => {
                warn!(
                    "'{}' cannot be added. Unrecognized file type",
                    entry.relative_path().display()
                );
                Ok(())
            }
        }
    }

    /// Touch an entry in the repository. Directories get an in-place
    /// metadata update; everything else is replaced, with the statistics
    /// reconciled so the net effect is a single "changed" item.
    pub fn touch(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        self.ensure_allowed(&entry)?;

        if entry.is_graft_marker() {
            return Ok(());
        }
        if entry.is_directory() {
            self.touch_directory(&entry)?;
            stats::inc(&self.counters.n_directories_changed);
            return Ok(());
        }

        if entry.is_regular_file()
            || entry.is_symlink()
            || entry.is_special_file()
            || entry.is_whiteout()
        {
            // Replace keeps hardlink bookkeeping correct; afterwards the
            // remove-side statistics are cancelled and the net change is
            // attributed as a single modification.
            self.replace(entry.clone())?;

            let old_size = entry.rdonly_size() as i64;
            let new_size = entry.scratch_size() as i64;

            if entry.was_symlink() {
                stats::dec(&self.counters.n_symlinks_removed);
            } else {
                stats::dec(&self.counters.n_files_removed);
                stats::add(&self.counters.sz_removed_bytes, -old_size);
            }

            // Symlinks contribute zero bytes in either direction.
            let mut dif: i64 = 0;
            match (entry.was_symlink(), entry.is_symlink()) {
                (true, true) => stats::inc(&self.counters.n_symlinks_changed),
                (true, false) => {
                    stats::inc(&self.counters.n_symlinks_removed);
                    stats::inc(&self.counters.n_files_added);
                    dif += new_size;
                }
                (false, true) => {
                    stats::inc(&self.counters.n_files_removed);
                    stats::inc(&self.counters.n_symlinks_added);
                    dif -= old_size;
                }
                (false, false) => {
                    stats::inc(&self.counters.n_files_changed);
                    dif += new_size - old_size;
                }
            }
            if dif > 0 {
                stats::add(&self.counters.sz_added_bytes, dif);
            } else {
                stats::add(&self.counters.sz_removed_bytes, -dif);
            }
            return Ok(());
        }

        warn!(
            "'{}' cannot be touched. Unrecognized file type",
            entry.relative_path().display()
        );
        Ok(())
    }

    /// Remove an entry from the repository. Directories are removed
    /// recursively, descendants first.
    pub fn remove(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        self.ensure_allowed(&entry)?;

        match entry.old_kind() {
            Some(ItemKind::Directory) => self.remove_directory_recursively(entry),
            Some(
                ItemKind::File
                | ItemKind::Symlink
                | ItemKind::CharDev
                | ItemKind::BlockDev
                | ItemKind::Fifo
                | ItemKind::Socket
                | ItemKind::Whiteout
                | ItemKind::GraftMarker
                | ItemKind::CatalogMarker
                | ItemKind::BundleSpec,
            ) => self.remove_file(&entry),
            Some(ItemKind::Unknown) | None => {
                warn!(
                    "'{}' cannot be deleted. Unrecognized file type",
                    entry.relative_path().display()
                );
                Ok(())
            }
        }
    }

    /// Remove the old entry and add the new one.
    pub fn replace(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        self.remove(entry.clone())?;
        self.add(entry)
    }

    pub fn enter_directory(&mut self, _entry: &SyncItem) {
        if !self.handle_hardlinks {
            return;
        }
        self.hardlink_stack.push(HardlinkGroupMap::new());
    }

    pub fn leave_directory(&mut self, entry: &SyncItem) -> Result<(), PublishError> {
        if !self.handle_hardlinks {
            return Ok(());
        }
        self.complete_hardlinks(entry)?;
        let scope = self
            .hardlink_stack
            .pop()
            .expect("hardlink scope stack is non-empty on directory exit");
        self.add_local_hardlink_groups(scope)
    }

    /// Do any pending processing and commit all changes to the catalog.
    /// Terminal: consumes the mediator, so a second commit cannot happen.
    pub fn commit(mut self) -> Result<Option<Manifest>, PublishError> {
        self.reporter.commit_report();

        if !self.params.dry_run {
            info!("waiting for upload of files before committing");
            self.spooler.wait_for_upload();
        }

        if !self.uploads.hardlink_queue.lock().is_empty() {
            debug_assert!(self.handle_hardlinks);
            info!("processing hardlinks");
            self.spooler.unregister_listeners();
            let listener_state = self.uploads.clone();
            self.spooler.register_listener(Arc::new(move |result| {
                publish_hardlinks_callback(&listener_state, result)
            }));

            // Snapshot the master paths so the lock is not held while the
            // spooler runs; completions annotate the queue under the lock.
            let masters: Vec<PathBuf> = self
                .uploads
                .hardlink_queue
                .lock()
                .iter()
                .map(|group| group.master.union_path().to_path_buf())
                .collect();
            for path in &masters {
                debug!("spooling hardlink group {}", path.display());
                self.spooler.process(path);
            }
            self.spooler.wait_for_upload();

            let groups = std::mem::take(&mut *self.uploads.hardlink_queue.lock());
            for group in &groups {
                debug!(
                    "processing hardlink group {}",
                    group.master.union_path().display()
                );
                self.add_hardlink_group(group)?;
            }
        }

        if let Some(engine) = &self.union {
            engine.post_upload();
        }
        self.spooler.unregister_listeners();

        if self.params.dry_run {
            return Ok(None);
        }

        info!("committing file catalogs");
        let upload_errors = self.spooler.num_errors();
        if upload_errors > 0 {
            error!("failed to commit files");
            return Err(PublishError::UploadErrors {
                count: upload_errors,
            });
        }

        if self.catalog.is_balanceable()
            || self.params.virtual_catalog_action != VirtualCatalogAction::None
        {
            if self.catalog.is_balanceable() {
                self.catalog.balance()?;
            }
            // Upload a zero-byte object so the content of the auto catalog
            // markers is present in the store.
            let marker = tempfile::Builder::new()
                .prefix("empty")
                .tempfile_in(&self.params.dir_temp)?;
            self.spooler.process(marker.path());
            self.spooler.wait_for_upload();
            let marker_errors = self.spooler.num_errors();
            if marker_errors > 0 {
                error!("failed to commit auto catalog marker");
                return Err(PublishError::UploadErrors {
                    count: marker_errors,
                });
            }
        }

        self.catalog.precalculate_listings()?;
        let manifest = self.catalog.commit(
            self.params.stop_for_catalog_tweaks,
            self.params.manual_revision,
        )?;
        Ok(Some(manifest))
    }

    /// The reserved metadata namespace is generated by the virtual catalog
    /// machinery; a change set entry inside it means either a corrupted
    /// overlay or a malicious input. Never an ordinary error.
    fn ensure_allowed(&self, entry: &SyncItem) -> Result<(), PublishError> {
        let relative = entry.relative_path();
        if in_reserved_namespace(&relative) {
            error!("invalid attempt to modify {}", relative.display());
            return Err(PublishError::ReservedPath(relative));
        }
        Ok(())
    }

    fn engine(&self) -> Arc<dyn UnionEngine> {
        self.union
            .clone()
            .expect("union engine registered before traversal")
    }

    fn create_item(
        &self,
        parent: &Path,
        name: &str,
        hint: ItemKind,
    ) -> Result<SyncItem, PublishError> {
        self.engine().create_item(parent, name, hint)
    }

    fn effective_xattrs(&self, entry: &SyncItem) -> XattrList {
        if self.params.include_xattrs {
            entry.xattrs().clone()
        } else {
            XattrList::new()
        }
    }

    fn add_file_or_hardlink(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        if self.handle_hardlinks && entry.has_hardlinks() {
            self.insert_hardlink(entry);
            Ok(())
        } else {
            self.add_file(entry)
        }
    }

    fn add_bundle_spec(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        warn!("bundle specification file encountered; bundles are an experimental feature");

        if entry.has_hardlinks() {
            return Err(PublishError::BundleSpec(
                "bundle specification must not be a hard link".into(),
            ));
        }
        if !entry.relative_parent().as_os_str().is_empty() {
            return Err(PublishError::BundleSpec(format!(
                "bundle specification must be in the root directory, found in {}",
                entry.relative_parent().display()
            )));
        }
        let text = std::fs::read_to_string(entry.union_path())?;
        serde_json::from_str::<serde_json::Value>(&text).map_err(|err| {
            PublishError::BundleSpec(format!("not a valid JSON document: {err}"))
        })?;

        self.add_file(entry)
    }

    fn add_file(&mut self, mut entry: SyncItem) -> Result<(), PublishError> {
        self.reporter
            .on_add(&entry.union_path().display().to_string());

        if (entry.is_symlink() || entry.is_special_file() || entry.is_whiteout())
            && !self.params.dry_run
        {
            // Symlinks, special files and whiteout markers are stored
            // entirely in the catalog.
            let xattrs = self.effective_xattrs(&entry);
            self.catalog
                .add_file(entry.catalog_entry(), &xattrs, entry.relative_parent())?;
        } else if entry.has_graft() && !self.params.dry_run {
            match entry.graft().clone() {
                GraftState::Valid(info) => {
                    entry.set_content_hash(info.content_hash);
                    let dirent = entry.catalog_entry();
                    let xattrs = XattrList::new();
                    match &info.chunks {
                        Some(chunks) => self.catalog.add_chunked_file(
                            dirent,
                            &xattrs,
                            entry.relative_parent(),
                            chunks,
                        )?,
                        None => {
                            self.catalog
                                .add_file(dirent, &xattrs, entry.relative_parent())?
                        }
                    }
                }
                GraftState::Invalid | GraftState::None => {
                    // Grafted files can be unpublishable when the sidecar is
                    // missing information; continuing would publish a file
                    // whose content is not in the store.
                    error!(
                        "grafted file {} carries invalid grafting information",
                        entry.relative_path().display()
                    );
                    return Err(PublishError::InvalidGraft(entry.relative_path()));
                }
            }
        } else if entry.relative_parent().as_os_str().is_empty() && entry.is_catalog_marker() {
            return Err(PublishError::CatalogMarkerAtRoot);
        } else if !self.params.dry_run {
            // Remember the entry for the upload source path, then spool it.
            {
                let mut queue = self.uploads.file_queue.lock();
                queue.insert(entry.union_path().to_path_buf(), entry.clone());
            }
            self.spooler.process(entry.union_path());
        }

        if entry.is_new() {
            if entry.is_symlink() {
                stats::inc(&self.counters.n_symlinks_added);
            } else {
                stats::inc(&self.counters.n_files_added);
                stats::add(&self.counters.sz_added_bytes, entry.scratch_size() as i64);
            }
        }
        Ok(())
    }

    fn remove_file(&mut self, entry: &SyncItem) -> Result<(), PublishError> {
        self.reporter
            .on_remove(&entry.union_path().display().to_string());

        if !self.params.dry_run {
            if self.handle_hardlinks && entry.rdonly_link_count() > 1 {
                debug!(
                    "removing {} from hardlink group",
                    entry.union_path().display()
                );
                self.catalog.shrink_hardlink_group(&entry.relative_path())?;
            }
            self.catalog.remove_file(&entry.relative_path())?;
        }

        if entry.was_symlink() {
            stats::inc(&self.counters.n_symlinks_removed);
        } else {
            stats::inc(&self.counters.n_files_removed);
            stats::add(&self.counters.sz_removed_bytes, entry.rdonly_size() as i64);
        }
        Ok(())
    }

    fn add_directory(&mut self, entry: &SyncItem) -> Result<(), PublishError> {
        if entry.name() == BUNDLE_SPEC_NAME {
            return Err(PublishError::ReservedDirectoryName(entry.relative_path()));
        }

        self.reporter
            .on_add(&entry.union_path().display().to_string());
        stats::inc(&self.counters.n_directories_added);

        if !self.params.dry_run {
            let xattrs = self.effective_xattrs(entry);
            self.catalog
                .add_directory(entry.catalog_entry(), &xattrs, entry.relative_parent())?;
        }

        if entry.has_catalog_marker()
            && !self.catalog.is_transition_point(&entry.relative_path())
        {
            self.create_nested_catalog(entry)?;
        }
        Ok(())
    }

    fn add_directory_recursively(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        self.add_directory(&entry)?;

        let scratch_root = self.engine().scratch_path().to_path_buf();
        let mut visitor = AddVisitor { mediator: self };
        FsTraversal::new(scratch_root, true).traverse(&entry.relative_path(), &mut visitor)
    }

    /// Delete a single, already emptied directory entry.
    fn remove_directory(&mut self, entry: &SyncItem) -> Result<(), PublishError> {
        let path = entry.relative_path();
        if self.catalog.is_transition_point(&path) {
            self.remove_nested_catalog(entry)?;
        }

        self.reporter
            .on_remove(&entry.union_path().display().to_string());
        if !self.params.dry_run {
            self.catalog.remove_directory(&path)?;
        }
        stats::inc(&self.counters.n_directories_removed);
        Ok(())
    }

    fn remove_directory_recursively(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        // Empty the directory first; deleting it would otherwise race its
        // own recursion.
        let rdonly_root = self.engine().rdonly_path().to_path_buf();
        let mut visitor = RemoveVisitor { mediator: self };
        FsTraversal::new(rdonly_root, false).traverse(&entry.relative_path(), &mut visitor)?;

        self.remove_directory(&entry)
    }

    fn create_nested_catalog(&mut self, directory: &SyncItem) -> Result<(), PublishError> {
        let notice = format!("Nested catalog at {}", directory.union_path().display());
        self.reporter.on_add(&notice);

        if !self.params.dry_run {
            self.catalog
                .create_nested_catalog(&directory.relative_path())?;
        }
        Ok(())
    }

    fn remove_nested_catalog(&mut self, directory: &SyncItem) -> Result<(), PublishError> {
        let notice = format!("Nested catalog at {}", directory.union_path().display());
        self.reporter.on_remove(&notice);

        if !self.params.dry_run {
            self.catalog
                .remove_nested_catalog(&directory.relative_path())?;
        }
        Ok(())
    }

    fn hardlink_map(&mut self) -> &mut HardlinkGroupMap {
        self.hardlink_stack
            .last_mut()
            .expect("inside a directory scope while aggregating hardlinks")
    }

    fn insert_hardlink(&mut self, entry: SyncItem) {
        debug_assert!(self.handle_hardlinks);

        let inode = entry.inode();
        debug!(
            inode,
            "found hardlink at {}",
            entry.union_path().display()
        );

        let is_new = entry.is_new();
        let is_symlink = entry.is_symlink();
        let scratch_size = entry.scratch_size() as i64;

        let map = self.hardlink_map();
        match map.get_mut(&inode) {
            Some(group) => group.add_member(entry),
            None => {
                map.insert(inode, HardlinkGroup::new(entry));
            }
        }

        if is_new {
            if is_symlink {
                stats::inc(&self.counters.n_symlinks_added);
            } else {
                stats::inc(&self.counters.n_files_added);
                stats::add(&self.counters.sz_added_bytes, scratch_size);
            }
        }
    }

    /// Fold an untouched on-disk sibling into a modified hardlink group.
    /// When one element of a group is edited, every element must be
    /// replaced; the legacy member is removed here and re-added with the
    /// group.
    fn insert_legacy_hardlink(&mut self, entry: SyncItem) -> Result<(), PublishError> {
        debug_assert!(self.handle_hardlinks);

        if entry.link_count() < 2 {
            return Ok(());
        }

        let inode = entry.inode();
        let touched_group = match self.hardlink_map().get(&inode) {
            Some(group) => !group.contains(entry.union_path()),
            None => false,
        };
        if !touched_group {
            return Ok(());
        }

        debug!("picked up legacy hardlink {}", entry.union_path().display());
        self.remove(entry.clone())?;
        self.hardlink_map()
            .get_mut(&inode)
            .expect("group still present after legacy removal")
            .add_member(entry);
        Ok(())
    }

    /// Flat scan of the directory being left, looking for untouched legacy
    /// members of any hardlink group modified in this change set.
    fn complete_hardlinks(&mut self, entry: &SyncItem) -> Result<(), PublishError> {
        debug_assert!(self.handle_hardlinks);

        if self.hardlink_map().is_empty() {
            return Ok(());
        }

        debug!(
            "post-processing hardlinks in {}",
            entry.union_path().display()
        );
        let union_root = self.engine().union_path().to_path_buf();
        let mut visitor = LegacyHardlinkVisitor { mediator: self };
        FsTraversal::new(union_root, false).traverse(&entry.relative_path(), &mut visitor)
    }

    /// All hardlinks in the directory scope have been picked up; flush the
    /// groups. Symlink and special-file groups carry no uploadable content
    /// and commit immediately; plain-file groups defer their single shared
    /// upload to the commit phase.
    fn add_local_hardlink_groups(
        &mut self,
        scope: HardlinkGroupMap,
    ) -> Result<(), PublishError> {
        debug_assert!(self.handle_hardlinks);

        let mut groups: Vec<HardlinkGroup> = scope.into_values().collect();
        groups.sort_by(|a, b| a.master.union_path().cmp(b.master.union_path()));

        for group in groups {
            if group.len() as u64 != group.master.link_count()
                && !self.params.ignore_xdir_hardlinks
            {
                error!(
                    "hardlinks across directories ({})",
                    group.master.union_path().display()
                );
                return Err(PublishError::CrossDirectoryHardlinks(
                    group.master.union_path().to_path_buf(),
                ));
            }

            if self.params.print_changeset {
                let parent = group
                    .master
                    .union_path()
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .to_path_buf();
                for member in group.members.values() {
                    let notice = parent.join(member.name()).display().to_string();
                    self.reporter.on_add(&notice);
                }
            }

            if self.params.dry_run {
                continue;
            }

            if group.master.is_symlink() || group.master.is_special_file() {
                self.add_hardlink_group(&group)?;
            } else {
                self.uploads.hardlink_queue.lock().push(group);
            }
        }
        Ok(())
    }

    fn add_hardlink_group(&self, group: &HardlinkGroup) -> Result<(), PublishError> {
        let entries: Vec<DirectoryEntry> = group
            .members
            .values()
            .map(SyncItem::catalog_entry)
            .collect();
        let xattrs = self.effective_xattrs(&group.master);
        self.catalog
            .add_hardlink_group(
                entries,
                &xattrs,
                group.master.relative_parent(),
                &group.chunks,
            )
            .map_err(Into::into)
    }
}

/// Completion callback for ordinary file uploads. Runs on a spooler thread;
/// a missing correlation entry or a failed item is a bookkeeping invariant
/// violation and panics.
fn publish_files_callback(state: &UploadState, result: &SpoolerResult) {
    debug!(
        path = %result.local_path.display(),
        digest = %result.content_hash,
        chunks = result.chunks.len(),
        return_code = result.return_code,
        "upload completion"
    );
    if result.return_code != 0 {
        error!(
            "spool failure for {} ({})",
            result.local_path.display(),
            result.return_code
        );
        panic!(
            "spool failure for {} ({})",
            result.local_path.display(),
            result.return_code
        );
    }

    let mut item = {
        let mut queue = state.file_queue.lock();
        queue.remove(&result.local_path)
    }
    .unwrap_or_else(|| {
        panic!(
            "upload completion for unknown path {}",
            result.local_path.display()
        )
    });

    item.set_content_hash(result.content_hash);
    item.set_compression(result.compression);

    let xattrs = if state.include_xattrs {
        item.xattrs().clone()
    } else {
        XattrList::new()
    };

    let outcome = if result.is_chunked() {
        state.catalog.add_chunked_file(
            item.catalog_entry(),
            &xattrs,
            item.relative_parent(),
            &result.chunks,
        )
    } else {
        state
            .catalog
            .add_file(item.catalog_entry(), &xattrs, item.relative_parent())
    };
    if let Err(err) = outcome {
        panic!(
            "catalog mutation failed during upload completion for {}: {}",
            result.local_path.display(),
            err
        );
    }
}

/// Completion callback for the deferred hardlink pass. Propagates the
/// resulting hash (and chunk list) to every member of the matching group.
fn publish_hardlinks_callback(state: &UploadState, result: &SpoolerResult) {
    debug!(
        path = %result.local_path.display(),
        digest = %result.content_hash,
        return_code = result.return_code,
        "hardlink upload completion"
    );
    if result.return_code != 0 {
        error!(
            "spool failure for {} ({})",
            result.local_path.display(),
            result.return_code
        );
        panic!(
            "spool failure for {} ({})",
            result.local_path.display(),
            result.return_code
        );
    }

    let mut queue = state.hardlink_queue.lock();
    let group = queue
        .iter_mut()
        .find(|group| group.master.union_path() == result.local_path)
        .unwrap_or_else(|| {
            panic!(
                "hardlink upload completion for unknown group {}",
                result.local_path.display()
            )
        });

    group.master.set_content_hash(result.content_hash);
    group.master.set_compression(result.compression);
    for member in group.members.values_mut() {
        member.set_content_hash(result.content_hash);
        member.set_compression(result.compression);
    }
    if result.is_chunked() {
        group.chunks = result.chunks.clone();
    }
}

/// Recursive pass over a newly added directory in the scratch tree.
struct AddVisitor<'a> {
    mediator: &'a mut SyncMediator,
}

impl AddVisitor<'_> {
    fn add_kind(&mut self, parent: &Path, name: &str, kind: ItemKind) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, kind)?;
        self.mediator.add(item)
    }
}

impl TreeVisitor for AddVisitor<'_> {
    fn ignore(&mut self, parent: &Path, name: &str) -> bool {
        if self.mediator.engine().ignore_file(parent, name) {
            return true;
        }
        self.mediator
            .create_item(parent, name, ItemKind::Unknown)
            .map(|item| item.is_whiteout())
            .unwrap_or(false)
    }

    fn enter_dir(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, ItemKind::Directory)?;
        self.mediator.enter_directory(&item);
        Ok(())
    }

    fn leave_dir(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, ItemKind::Directory)?;
        self.mediator.leave_directory(&item)
    }

    fn dir_prefix(&mut self, parent: &Path, name: &str) -> Result<bool, PublishError> {
        let item = self.mediator.create_item(parent, name, ItemKind::Directory)?;
        self.mediator.add_directory(&item)?;
        Ok(true)
    }

    fn file(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::File)
    }

    fn symlink(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::Symlink)
    }

    fn char_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::CharDev)
    }

    fn block_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::BlockDev)
    }

    fn fifo(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::Fifo)
    }

    fn socket(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.add_kind(parent, name, ItemKind::Socket)
    }
}

/// Level-by-level pass over a removed directory in the base tree.
struct RemoveVisitor<'a> {
    mediator: &'a mut SyncMediator,
}

impl RemoveVisitor<'_> {
    fn remove_kind(
        &mut self,
        parent: &Path,
        name: &str,
        kind: ItemKind,
    ) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, kind)?;
        self.mediator.remove(item)
    }
}

impl TreeVisitor for RemoveVisitor<'_> {
    fn dir_postfix(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, ItemKind::Directory)?;
        self.mediator.remove_directory_recursively(item)
    }

    fn file(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::File)
    }

    fn symlink(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::Symlink)
    }

    fn char_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::CharDev)
    }

    fn block_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::BlockDev)
    }

    fn fifo(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::Fifo)
    }

    fn socket(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.remove_kind(parent, name, ItemKind::Socket)
    }
}

/// Flat scan of a union directory for untouched legacy hardlinks.
struct LegacyHardlinkVisitor<'a> {
    mediator: &'a mut SyncMediator,
}

impl LegacyHardlinkVisitor<'_> {
    fn legacy_kind(
        &mut self,
        parent: &Path,
        name: &str,
        kind: ItemKind,
    ) -> Result<(), PublishError> {
        let item = self.mediator.create_item(parent, name, kind)?;
        self.mediator.insert_legacy_hardlink(item)
    }
}

impl TreeVisitor for LegacyHardlinkVisitor<'_> {
    fn file(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::File)
    }

    fn symlink(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::Symlink)
    }

    fn char_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::CharDev)
    }

    fn block_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::BlockDev)
    }

    fn fifo(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::Fifo)
    }

    fn socket(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        self.legacy_kind(parent, name, ItemKind::Socket)
    }
}
