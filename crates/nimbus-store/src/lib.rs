//! Storage engine for Nimbus.
//!
//! Nimbus emulates a cloud object storage service; this crate is the engine
//! beneath the protocol layer. Three layers compose it:
//!
//! - the chunk store ([`ChunkStore`], [`FileChunkStore`]): deduplicating,
//!   content-addressed blob storage with atomic publish,
//! - the metadata catalog ([`MetaStore`], [`RocksCatalog`]): a
//!   transactional record of buckets and versioned object metadata,
//! - the object store ([`ObjectStore`]): the facade binding the two into
//!   streaming object reads and writes.
//!
//! Callers interact only with the object store; the two lower layers never
//! call each other. All operations are synchronous and blocking; run them
//! on separate threads for concurrency.

mod chunk;
mod clock;
mod error;
mod meta;
mod object;

pub use chunk::{ChunkReader, ChunkStore, ChunkWriter, FileChunkStore};
pub use clock::{GenerationSource, MonotonicGenerations};
pub use error::{ErrorKind, StorageError};
pub use meta::{CatalogConfig, MetaBucket, MetaStore, RocksCatalog};
pub use object::{Bucket, Object, ObjectReader, ObjectStore, ObjectWriter};

// Re-export the shared value types so callers need only this crate.
pub use nimbus_types::{
    BucketMetadata, ContentDigest, LegacyChecksum, NewBucketOptions, ObjectRecord,
    PutObjectOptions,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
