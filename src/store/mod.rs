//! Storage provider abstraction.
//!
//! The engine is handed a pre-authenticated [`ObjectStore`] by the caller;
//! credential acquisition lives outside this crate. Version records are
//! owned by the provider — the engine reads and deletes them, never
//! fabricates them.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::hash::ContentHash;

pub use memory::MemoryStore;

/// Metadata for one live remote object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Raw remote key; may carry the compression suffix.
    pub key: String,
    /// Stored (on-wire) size in bytes.
    pub size: u64,
    pub updated: DateTime<Utc>,
    /// Digest of the uncompressed content, when recorded at upload time.
    /// Objects written by other tools may not carry one.
    pub content_hash: Option<ContentHash>,
}

/// One retained historical copy of a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    /// Raw remote key this version belongs to.
    pub key: String,
    /// Provider-assigned ordinal; newer versions have larger generations.
    pub generation: u64,
    pub size: u64,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Uncompressed-content digest to attach as object metadata.
    pub content_hash: Option<ContentHash>,
}

/// Pre-authenticated handle to one bucket.
///
/// Implementations map provider faults to [`crate::error::SyncError`]:
/// network-shaped failures to `Transient`, everything else to `Storage`.
/// An empty bucket is not an error — `list` returns an empty vec.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all live objects.
    async fn list(&self) -> Result<Vec<ObjectMeta>>;

    /// Metadata for one live object, or `None` if absent.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Download one live object.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Upload a new live version of `key`.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<()>;

    /// Remove an object and all its versions.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every retained version of every object, newest-first per key.
    async fn list_versions(&self) -> Result<Vec<VersionRecord>>;

    /// Delete one historical version.
    async fn delete_version(&self, key: &str, generation: u64) -> Result<()>;
}
