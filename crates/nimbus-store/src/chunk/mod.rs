//! Content-addressed chunk storage.
//!
//! Chunks are immutable byte blobs addressed by the SHA-256 digest of their
//! contents. Writers stage bytes to a location invisible to readers and
//! publish atomically on finish; identical content always lands at the same
//! address, so duplicate writes deduplicate without any bookkeeping. This
//! layer knows nothing about buckets or objects.

mod file;

pub use file::FileChunkStore;

use crate::Result;
use nimbus_types::{ContentDigest, LegacyChecksum};
use std::io;

/// A content-addressed chunk store.
pub trait ChunkStore: Send + Sync {
    /// Opens a writer that stages a new chunk.
    ///
    /// The staged bytes stay invisible to readers until
    /// [`ChunkWriter::finish`] publishes them. No size limit is enforced at
    /// this layer.
    fn new_writer(&self) -> Result<Box<dyn ChunkWriter>>;

    /// Opens a streaming, seekable reader over the chunk stored at `digest`.
    ///
    /// Fails with [`StorageError::ChunkNotFound`] if no such chunk exists.
    ///
    /// [`StorageError::ChunkNotFound`]: crate::StorageError::ChunkNotFound
    fn new_reader(&self, digest: &ContentDigest) -> Result<Box<dyn ChunkReader>>;

    /// Removes the chunk stored at `digest`, unconditionally.
    ///
    /// The store performs no reference counting; the caller must ensure no
    /// live object version still references the chunk.
    fn delete(&self, digest: &ContentDigest) -> Result<()>;
}

/// A staged chunk write.
///
/// Bytes written through the [`io::Write`] impl feed the staging sink and
/// both running digests incrementally; the body is never buffered in
/// memory.
pub trait ChunkWriter: io::Write + Send {
    /// Publishes the staged bytes and returns their digests.
    ///
    /// Finishing syncs the staged content, derives the publish path from
    /// the content digest, and atomically moves the content into place.
    /// Publishing content whose digest already exists is idempotent.
    ///
    /// Consuming the writer makes a second finish unrepresentable; an
    /// abandoned writer removes its staging file on drop.
    fn finish(self: Box<Self>) -> Result<(ContentDigest, LegacyChecksum)>;
}

/// A streaming, seekable handle over one stored chunk.
///
/// Dropping the reader releases it.
pub trait ChunkReader: io::Read + io::Seek + Send {}

impl<T: io::Read + io::Seek + Send> ChunkReader for T {}
