//! Deterministic directory-tree traversal.
//!
//! Drives a [`TreeVisitor`] over one physical layer (scratch, base or union
//! view). Entries are visited in sorted order so publish runs are
//! reproducible. The traversal is used three ways by the mediator: the
//! recursive add pass over the scratch tree, the level-by-level remove pass
//! over the base tree, and the flat legacy-hardlink scan of a union
//! directory.

use crate::error::PublishError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Callbacks invoked while a tree is traversed.
///
/// For a directory `d` that is descended into, the order is:
/// `dir_prefix(d)` → `enter_dir(d)` → children → `leave_dir(d)` →
/// `dir_postfix(d)`. When `dir_prefix` declines recursion (or the traversal
/// is flat), `dir_postfix` follows immediately and `enter_dir`/`leave_dir`
/// are not invoked. The start directory itself only receives
/// `enter_dir`/`leave_dir`.
#[allow(unused_variables)]
pub trait TreeVisitor {
    /// Skip this entry entirely (no callbacks, no recursion).
    fn ignore(&mut self, parent: &Path, name: &str) -> bool {
        false
    }

    fn enter_dir(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn leave_dir(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    /// A directory was found. Return `false` to skip its contents.
    fn dir_prefix(&mut self, parent: &Path, name: &str) -> Result<bool, PublishError> {
        Ok(true)
    }

    /// A directory's subtree (possibly skipped) has been handled.
    fn dir_postfix(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn file(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn symlink(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn char_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn block_dev(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn fifo(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }

    fn socket(&mut self, parent: &Path, name: &str) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Sorted filesystem traversal rooted at one physical layer.
///
/// All paths handed to the visitor are relative to `base`, so they can be
/// fed straight into the union engine's item resolution.
pub struct FsTraversal {
    base: PathBuf,
    recurse: bool,
}

impl FsTraversal {
    pub fn new(base: impl Into<PathBuf>, recurse: bool) -> Self {
        Self {
            base: base.into(),
            recurse,
        }
    }

    /// Traverse the directory at `start` (relative to the base layer).
    pub fn traverse(
        &self,
        start: &Path,
        visitor: &mut dyn TreeVisitor,
    ) -> Result<(), PublishError> {
        let start_abs = self.base.join(start);
        let (start_parent, start_name) = split_rel(start);
        visitor.enter_dir(&start_parent, &start_name)?;

        // Directories currently descended into, below the start directory.
        let mut open: Vec<(PathBuf, PathBuf, String)> = Vec::new();

        let max_depth = if self.recurse { usize::MAX } else { 1 };
        let mut it = WalkDir::new(&start_abs)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = it.next() {
            let entry = entry.map_err(|e| PublishError::Io(e.into()))?;
            let rel = entry
                .path()
                .strip_prefix(&self.base)
                .expect("walked path lies under the traversal base")
                .to_path_buf();
            let parent = rel.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            let name = entry.file_name().to_string_lossy().into_owned();

            // Close directories the walk has moved past.
            while let Some((open_rel, _, _)) = open.last() {
                if parent.starts_with(open_rel) {
                    break;
                }
                let (_, open_parent, open_name) = open.pop().expect("non-empty open stack");
                visitor.leave_dir(&open_parent, &open_name)?;
                visitor.dir_postfix(&open_parent, &open_name)?;
            }

            if visitor.ignore(&parent, &name) {
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let descend = visitor.dir_prefix(&parent, &name)?;
                if self.recurse && descend {
                    visitor.enter_dir(&parent, &name)?;
                    open.push((rel, parent, name));
                } else {
                    it.skip_current_dir();
                    visitor.dir_postfix(&parent, &name)?;
                }
            } else if file_type.is_symlink() {
                visitor.symlink(&parent, &name)?;
            } else if file_type.is_file() {
                visitor.file(&parent, &name)?;
            } else {
                dispatch_special(visitor, file_type, &parent, &name)?;
            }
        }

        while let Some((_, open_parent, open_name)) = open.pop() {
            visitor.leave_dir(&open_parent, &open_name)?;
            visitor.dir_postfix(&open_parent, &open_name)?;
        }

        visitor.leave_dir(&start_parent, &start_name)?;
        Ok(())
    }
}

#[cfg(unix)]
fn dispatch_special(
    visitor: &mut dyn TreeVisitor,
    file_type: std::fs::FileType,
    parent: &Path,
    name: &str,
) -> Result<(), PublishError> {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_char_device() {
        visitor.char_dev(parent, name)
    } else if file_type.is_block_device() {
        visitor.block_dev(parent, name)
    } else if file_type.is_fifo() {
        visitor.fifo(parent, name)
    } else if file_type.is_socket() {
        visitor.socket(parent, name)
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
fn dispatch_special(
    _visitor: &mut dyn TreeVisitor,
    _file_type: std::fs::FileType,
    _parent: &Path,
    _name: &str,
) -> Result<(), PublishError> {
    Ok(())
}

fn split_rel(path: &Path) -> (PathBuf, String) {
    let parent = path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (parent, name)
}
