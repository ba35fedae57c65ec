//! Transactional bucket/object catalog.
//!
//! The catalog knows nothing about chunk bytes, only about chunk digests.
//! Every mutating operation runs inside a single write transaction; a crash
//! or failure mid-operation leaves previously committed state untouched.
//! One write transaction is in flight at a time across the whole catalog,
//! while reads run concurrently against consistent snapshots.

mod rocks;

pub use rocks::{CatalogConfig, RocksCatalog};

use crate::Result;
use nimbus_types::{BucketMetadata, NewBucketOptions, ObjectRecord, PutObjectOptions};
use std::sync::Arc;

/// The catalog of buckets.
pub trait MetaStore: Send + Sync {
    /// Looks up an existing bucket.
    ///
    /// Fails with [`StorageError::BucketNotFound`] if the bucket does not
    /// exist.
    ///
    /// [`StorageError::BucketNotFound`]: crate::StorageError::BucketNotFound
    fn bucket(&self, name: &str) -> Result<Arc<dyn MetaBucket>>;

    /// Creates a bucket, failing if the name is taken.
    ///
    /// The existence check and the creation commit inside one write
    /// transaction, so concurrent creators cannot both succeed and a
    /// partially created bucket is never visible.
    fn create_bucket(
        &self,
        name: &str,
        options: NewBucketOptions,
    ) -> Result<Arc<dyn MetaBucket>>;

    /// Deletes a bucket and all object metadata nested under it.
    ///
    /// Chunk data referenced by the deleted records is not touched.
    fn delete_bucket(&self, name: &str) -> Result<()>;
}

/// A handle to one bucket's slice of the catalog.
pub trait MetaBucket: Send + Sync {
    /// Returns the bucket-level metadata.
    fn metadata(&self) -> Result<BucketMetadata>;

    /// Returns the current version of the named object.
    ///
    /// Fails with [`StorageError::ObjectNotFound`] when no record exists
    /// for the name, or when a record exists but has no current version.
    ///
    /// [`StorageError::ObjectNotFound`]: crate::StorageError::ObjectNotFound
    fn object(&self, name: &str) -> Result<ObjectRecord>;

    /// Records a finished write as the object's new current version.
    ///
    /// Runs one read-modify-write transaction: the new version gets fresh
    /// timestamps, a strictly greater generation, and metageneration 1.
    /// When the bucket has versioning enabled, the displaced current
    /// version is appended to the object's non-current history; otherwise
    /// it is dropped, leaving its chunks unreferenced.
    fn put_object(&self, name: &str, options: PutObjectOptions) -> Result<ObjectRecord>;
}
