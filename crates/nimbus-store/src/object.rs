//! Object store facade.
//!
//! Binds the chunk store and the metadata catalog into streaming object
//! reads and writes. A write streams into one chunk-store writer and then
//! records the resulting digest in the catalog; a read fetches the digest
//! list from the catalog and streams bytes sequentially out of the
//! referenced chunks. The chunk publish always happens before the metadata
//! write that references it, so the catalog never points at a chunk that
//! does not exist.

use crate::chunk::{ChunkReader, ChunkStore, ChunkWriter};
use crate::meta::{MetaBucket, MetaStore};
use crate::{Result, StorageError};
use nimbus_types::{ContentDigest, NewBucketOptions, ObjectRecord, PutObjectOptions};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The object store: a stateless facade over a catalog and a chunk store.
pub struct ObjectStore {
    meta: Arc<dyn MetaStore>,
    chunks: Arc<dyn ChunkStore>,
}

impl ObjectStore {
    /// Creates a store over the given catalog and chunk store.
    pub fn new(meta: Arc<dyn MetaStore>, chunks: Arc<dyn ChunkStore>) -> Self {
        Self { meta, chunks }
    }

    /// Looks up an existing bucket.
    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        let meta = self.meta.bucket(name)?;
        Ok(Bucket {
            meta,
            chunks: Arc::clone(&self.chunks),
            name: name.to_string(),
        })
    }

    /// Creates a bucket.
    pub fn create_bucket(&self, name: &str, options: NewBucketOptions) -> Result<Bucket> {
        let meta = self.meta.create_bucket(name, options)?;
        Ok(Bucket {
            meta,
            chunks: Arc::clone(&self.chunks),
            name: name.to_string(),
        })
    }
}

/// A bucket handle carrying both stores.
pub struct Bucket {
    meta: Arc<dyn MetaBucket>,
    chunks: Arc<dyn ChunkStore>,
    name: String,
}

impl Bucket {
    /// Returns a handle to the named object. Performs no I/O.
    pub fn object(&self, name: &str) -> Object {
        Object {
            meta: Arc::clone(&self.meta),
            chunks: Arc::clone(&self.chunks),
            name: name.to_string(),
        }
    }

    /// The bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A handle to one object name within a bucket.
pub struct Object {
    meta: Arc<dyn MetaBucket>,
    chunks: Arc<dyn ChunkStore>,
    name: String,
}

impl Object {
    /// Opens a writer for a new version of this object.
    ///
    /// The whole body is persisted as a single chunk regardless of size;
    /// there is no splitting policy.
    pub fn new_writer(&self) -> Result<ObjectWriter> {
        let writer = self.chunks.new_writer()?;
        Ok(ObjectWriter {
            meta: Arc::clone(&self.meta),
            name: self.name.clone(),
            writer,
        })
    }

    /// Opens a reader over the object's current version.
    pub fn new_reader(&self) -> Result<ObjectReader> {
        let metadata = self.meta.object(&self.name)?;
        let queue = metadata.chunks.iter().copied().collect();
        Ok(ObjectReader {
            chunks: Arc::clone(&self.chunks),
            metadata,
            queue,
            current: None,
            closed: AtomicBool::new(false),
        })
    }

    /// The object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A streaming write of one object version.
pub struct ObjectWriter {
    meta: Arc<dyn MetaBucket>,
    name: String,
    writer: Box<dyn ChunkWriter>,
}

impl io::Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ObjectWriter {
    /// Publishes the body chunk, then records the new current version and
    /// returns it.
    ///
    /// If the metadata write fails after the chunk was published, the chunk
    /// stays in place: it may already be shared by other objects through
    /// dedup, so it is never speculatively deleted. Consuming the writer
    /// makes a second close unrepresentable; dropping an unclosed writer
    /// abandons the staged chunk without publishing it.
    pub fn close(self) -> Result<ObjectRecord> {
        let ObjectWriter { meta, name, writer } = self;
        let (digest, checksum) = writer.finish()?;
        meta.put_object(
            &name,
            PutObjectOptions {
                chunks: vec![digest],
                checksum,
            },
        )
    }
}

/// A forward-only streaming read over an object's chunks.
///
/// Chunks are opened one at a time in metadata order; each is closed at its
/// end-of-stream before the next is opened. No cross-chunk seeking is
/// provided.
pub struct ObjectReader {
    chunks: Arc<dyn ChunkStore>,
    metadata: ObjectRecord,
    queue: VecDeque<ContentDigest>,
    current: Option<Box<dyn ChunkReader>>,
    closed: AtomicBool,
}

impl ObjectReader {
    /// The version this reader was opened against.
    #[must_use]
    pub fn metadata(&self) -> &ObjectRecord {
        &self.metadata
    }

    /// Releases whichever chunk reader is currently open, if any.
    ///
    /// A second close, like a read after close, fails with
    /// [`StorageError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        self.current = None;
        Ok(())
    }
}

impl io::Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::other(StorageError::Closed));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.current.is_none() {
                match self.queue.pop_front() {
                    // The digest list is exhausted: end of stream.
                    None => return Ok(0),
                    Some(digest) => {
                        let reader =
                            self.chunks.new_reader(&digest).map_err(io::Error::other)?;
                        self.current = Some(reader);
                    }
                }
            }

            if let Some(reader) = self.current.as_mut() {
                let n = reader.read(buf)?;
                if n == 0 {
                    // End of this chunk; release it and move to the next.
                    self.current = None;
                    continue;
                }
                return Ok(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FileChunkStore;
    use crate::meta::RocksCatalog;
    use nimbus_types::LegacyChecksum;
    use rand::RngCore;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn create_test_store() -> (ObjectStore, Arc<RocksCatalog>, Arc<FileChunkStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(RocksCatalog::open_default(dir.path().join("catalog")).unwrap());
        let chunks = Arc::new(FileChunkStore::new(dir.path().join("data")).unwrap());
        let meta: Arc<dyn MetaStore> = Arc::clone(&catalog);
        let data: Arc<dyn ChunkStore> = Arc::clone(&chunks);
        let store = ObjectStore::new(meta, data);
        (store, catalog, chunks, dir)
    }

    #[test]
    fn write_read_round_trip() {
        let (store, _catalog, _chunks, _dir) = create_test_store();
        let bucket = store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();

        let mut data = vec![0u8; 1024];
        rand::thread_rng().fill_bytes(&mut data);

        let object = bucket.object("cool");
        let mut writer = object.new_writer().unwrap();
        writer.write_all(&data).unwrap();
        let record = writer.close().unwrap();

        // The recorded chunk digest is the direct content address of the body.
        assert_eq!(record.chunks, vec![ContentDigest::compute(&data)]);
        assert_eq!(record.checksum, LegacyChecksum::compute(&data));

        let mut reader = object.new_reader().unwrap();
        assert_eq!(reader.metadata(), &record);
        let mut read = Vec::new();
        reader.read_to_end(&mut read).unwrap();
        assert_eq!(read, data);
        reader.close().unwrap();
    }

    #[test]
    fn overwrite_replaces_current_version() {
        let (store, _catalog, _chunks, _dir) = create_test_store();
        let bucket = store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();
        let object = bucket.object("doc");

        for body in [b"first".as_slice(), b"second".as_slice()] {
            let mut writer = object.new_writer().unwrap();
            writer.write_all(body).unwrap();
            writer.close().unwrap();
        }

        let mut reader = object.new_reader().unwrap();
        let mut read = Vec::new();
        reader.read_to_end(&mut read).unwrap();
        assert_eq!(read, b"second");
    }

    #[test]
    fn reader_walks_chunks_sequentially() {
        let (store, catalog, chunks, _dir) = create_test_store();
        let meta_bucket = catalog
            .create_bucket("multi", NewBucketOptions::default())
            .unwrap();

        // Record an object spanning two chunks; the facade only ever writes
        // single-chunk bodies, but it must read whatever the catalog lists.
        let mut digests = Vec::new();
        for part in [b"hello ".as_slice(), b"world".as_slice()] {
            let mut writer = chunks.new_writer().unwrap();
            writer.write_all(part).unwrap();
            let (digest, _) = writer.finish().unwrap();
            digests.push(digest);
        }
        meta_bucket
            .put_object(
                "combo",
                PutObjectOptions {
                    chunks: digests,
                    checksum: LegacyChecksum::compute(b"hello world"),
                },
            )
            .unwrap();

        let bucket = store.bucket("multi").unwrap();
        let mut reader = bucket.object("combo").new_reader().unwrap();
        let mut read = Vec::new();
        reader.read_to_end(&mut read).unwrap();
        assert_eq!(read, b"hello world");
    }

    #[test]
    fn read_after_close_is_misuse() {
        let (store, _catalog, _chunks, _dir) = create_test_store();
        let bucket = store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();

        let object = bucket.object("guarded");
        let mut writer = object.new_writer().unwrap();
        writer.write_all(b"body").unwrap();
        writer.close().unwrap();

        let mut reader = object.new_reader().unwrap();
        reader.close().unwrap();

        let mut buf = [0u8; 8];
        assert!(reader.read(&mut buf).is_err());
        assert!(matches!(reader.close().unwrap_err(), StorageError::Closed));
    }

    #[test]
    fn missing_object_and_bucket_are_not_found() {
        let (store, _catalog, _chunks, _dir) = create_test_store();
        store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();

        let bucket = store.bucket("my-bucket").unwrap();
        assert!(matches!(
            bucket.object("never-written").new_reader().unwrap_err(),
            StorageError::ObjectNotFound(_)
        ));

        // A bucket that was never created fails earlier, at the lookup.
        assert!(matches!(
            store.bucket("never-created").unwrap_err(),
            StorageError::BucketNotFound(_)
        ));
    }

    #[test]
    fn abandoned_object_writer_publishes_nothing() {
        let (store, _catalog, _chunks, _dir) = create_test_store();
        let bucket = store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();

        let object = bucket.object("ghost");
        let mut writer = object.new_writer().unwrap();
        writer.write_all(b"never closed").unwrap();
        drop(writer);

        assert!(matches!(
            object.new_reader().unwrap_err(),
            StorageError::ObjectNotFound(_)
        ));
    }

    #[test]
    fn identical_bodies_share_one_chunk() {
        let (store, _catalog, chunks, dir) = create_test_store();
        let bucket = store
            .create_bucket("my-bucket", NewBucketOptions::default())
            .unwrap();

        let body = b"shared body";
        let mut records = Vec::new();
        for name in ["a", "b"] {
            let mut writer = bucket.object(name).new_writer().unwrap();
            writer.write_all(body).unwrap();
            records.push(writer.close().unwrap());
        }
        assert_eq!(records[0].chunks, records[1].chunks);

        // Both objects read through the same stored chunk.
        let digest = records[0].chunks[0];
        let mut reader = chunks.new_reader(&digest).unwrap();
        let mut read = Vec::new();
        reader.read_to_end(&mut read).unwrap();
        assert_eq!(read, body);

        let hex = digest.to_hex();
        let shard = dir.path().join("data").join("chunks").join(&hex[..4]);
        assert_eq!(std::fs::read_dir(&shard).unwrap().count(), 1);
    }
}
