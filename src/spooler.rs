//! Content store (spooler) boundary.
//!
//! The spooler compresses, hashes, chunks and transmits file content
//! asynchronously. `process` is fire-and-forget; completions are delivered
//! to registered listeners on spooler-owned threads, and `wait_for_upload`
//! is the only barrier the mediator relies on.

use crate::catalog::FileChunk;
use crate::hash::{Compression, ContentHash};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Completion record for one processed source file.
#[derive(Debug, Clone)]
pub struct SpoolerResult {
    pub local_path: PathBuf,
    pub content_hash: ContentHash,
    pub compression: Compression,
    pub chunks: Vec<FileChunk>,
    /// Nonzero marks a failed item. The mediator treats this as fatal
    /// immediately rather than deferring to the commit barrier.
    pub return_code: i32,
}

impl SpoolerResult {
    /// The upload was split into chunks stored as separate objects.
    pub fn is_chunked(&self) -> bool {
        !self.chunks.is_empty()
    }
}

/// Upload completion callback. Invoked on a thread owned by the spooler,
/// never on the walk thread.
pub type UploadListener = Arc<dyn Fn(&SpoolerResult) + Send + Sync>;

/// Asynchronous content-addressed upload subsystem.
pub trait Spooler: Send + Sync {
    /// Queue `source` for hashing, compression and upload. Returns
    /// immediately; a completion record is delivered to listeners later.
    fn process(&self, source: &Path);

    fn register_listener(&self, listener: UploadListener);

    fn unregister_listeners(&self);

    /// Block until every upload issued so far has completed.
    fn wait_for_upload(&self);

    /// Number of failed items accumulated so far. Inspected at the commit
    /// barriers only.
    fn num_errors(&self) -> u64;
}
