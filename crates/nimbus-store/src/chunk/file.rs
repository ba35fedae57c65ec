//! Filesystem chunk store backend.
//!
//! Published chunks live under `<root>/chunks/<prefix>/<digest>`, where
//! `<prefix>` is the hex of the first two digest bytes, bounding directory
//! fan-out. In-flight writes stage under `<root>/uploads/` with unique
//! temporary names and are renamed into the chunk subtree on publish; both
//! subtrees must reside on the same volume for the rename to be atomic.

use crate::chunk::{ChunkReader, ChunkStore, ChunkWriter};
use crate::{Result, StorageError};
use md5::Context;
use nimbus_types::{ContentDigest, LegacyChecksum};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A chunk store persisting each chunk as one file under a root directory.
///
/// Independent writers need no coordination: each stages to its own
/// temporary file, and races on the same digest path are resolved by
/// rename atomicity, with content-identical results either way.
#[derive(Debug, Clone)]
pub struct FileChunkStore {
    root: PathBuf,
}

impl FileChunkStore {
    /// Opens a chunk store rooted at `root`, creating the directory if
    /// needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join("chunks").join(&hex[..4]).join(&hex)
    }

    fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

impl ChunkStore for FileChunkStore {
    fn new_writer(&self) -> Result<Box<dyn ChunkWriter>> {
        let uploads = self.uploads_dir();
        fs::create_dir_all(&uploads)?;

        let file = NamedTempFile::with_prefix_in("partial-", &uploads)?;
        Ok(Box::new(FileChunkWriter {
            store: self.clone(),
            file,
            digest: Sha256::new(),
            checksum: Context::new(),
        }))
    }

    fn new_reader(&self, digest: &ContentDigest) -> Result<Box<dyn ChunkReader>> {
        match File::open(self.chunk_path(digest)) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::ChunkNotFound(digest.to_hex()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, digest: &ContentDigest) -> Result<()> {
        match fs::remove_file(self.chunk_path(digest)) {
            Ok(()) => {
                tracing::debug!(digest = %digest, "chunk deleted");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::ChunkNotFound(digest.to_hex()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// A staged write feeding the temporary file and both running digests.
///
/// The temporary file is removed on drop unless it became the published
/// chunk.
struct FileChunkWriter {
    store: FileChunkStore,
    file: NamedTempFile,
    digest: Sha256,
    checksum: Context,
}

impl io::Write for FileChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.digest.update(&buf[..n]);
        self.checksum.consume(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ChunkWriter for FileChunkWriter {
    fn finish(self: Box<Self>) -> Result<(ContentDigest, LegacyChecksum)> {
        let writer = *self;
        writer.file.as_file().sync_all()?;

        let digest = ContentDigest::from_bytes(writer.digest.finalize().into());
        let checksum = LegacyChecksum::from_bytes(writer.checksum.compute().0);

        let dest = writer.store.chunk_path(&digest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // The rename is atomic. Losing a race against a concurrent writer
        // of the same digest still counts as a successful publish: content
        // is identical under equal digests, and the loser's staging file is
        // removed when the persist error drops.
        if let Err(err) = writer.file.persist(&dest) {
            if !dest.exists() {
                return Err(err.error.into());
            }
        }

        tracing::debug!(digest = %digest, "chunk published");
        Ok((digest, checksum))
    }
}
