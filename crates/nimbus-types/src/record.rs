//! Record types exchanged with the bucket/object catalog.

use crate::{ContentDigest, LegacyChecksum};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for creating a bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewBucketOptions {
    /// Whether the bucket retains non-current object versions. Immutable
    /// after creation.
    pub versioning: bool,
}

/// Options for recording a finished object write.
#[derive(Debug, Clone)]
pub struct PutObjectOptions {
    /// Digests of the chunks composing the object body, in read order.
    pub chunks: Vec<ContentDigest>,
    /// MD5 checksum of the whole body.
    pub checksum: LegacyChecksum,
}

/// Bucket-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMetadata {
    /// When the bucket was created.
    pub created_at: DateTime<Utc>,
    /// When the bucket record was last written.
    pub updated_at: DateTime<Utc>,
    /// Whether non-current object versions are retained.
    pub versioning: bool,
}

/// The externally visible fields of one object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// When this version was last updated.
    pub updated_at: DateTime<Utc>,
    /// When this version was deleted, if it ever was.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Digests of the chunks composing the body, in read order.
    pub chunks: Vec<ContentDigest>,
    /// MD5 checksum of the whole body.
    pub checksum: LegacyChecksum,
    /// Write identifier, strictly increasing across successive writes.
    pub generation: i64,
    /// Metadata revision within this generation.
    pub metageneration: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_serialize_self_describing() {
        let record = ObjectRecord {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            chunks: vec![ContentDigest::compute(b"body")],
            checksum: LegacyChecksum::compute(b"body"),
            generation: 7,
            metageneration: 1,
        };

        // The catalog persists records by field name; renaming a field is a
        // breaking change to stored data.
        let value = serde_json::to_value(&record).unwrap();
        for field in [
            "created_at",
            "updated_at",
            "deleted_at",
            "chunks",
            "checksum",
            "generation",
            "metageneration",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn new_bucket_options_default_to_unversioned() {
        assert!(!NewBucketOptions::default().versioning);
    }
}
