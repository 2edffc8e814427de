//! In-memory versioned object store.
//!
//! Backs unit and integration tests; supports injected transient failures
//! and payload tampering so retry and integrity paths can be exercised
//! without a network.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::store::{ObjectMeta, ObjectStore, PutOptions, VersionRecord};

#[derive(Debug, Clone)]
struct StoredVersion {
    generation: u64,
    data: Bytes,
    updated: DateTime<Utc>,
    content_hash: Option<crate::hash::ContentHash>,
}

#[derive(Debug, Default)]
struct Inner {
    /// key -> versions, newest first
    objects: BTreeMap<String, Vec<StoredVersion>>,
    next_generation: u64,
    put_failures: u32,
    get_failures: u32,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` puts with a transient error.
    pub async fn inject_put_failures(&self, n: u32) {
        self.inner.lock().await.put_failures = n;
    }

    /// Fail the next `n` gets with a transient error.
    pub async fn inject_get_failures(&self, n: u32) {
        self.inner.lock().await.get_failures = n;
    }

    /// Replace the live payload of `key` without touching its recorded
    /// digest, simulating silent corruption.
    pub async fn tamper_live(&self, key: &str, data: Bytes) {
        let mut inner = self.inner.lock().await;
        if let Some(versions) = inner.objects.get_mut(key) {
            if let Some(live) = versions.first_mut() {
                live.data = data;
            }
        }
    }

    /// Rewrite the timestamp of one version, for retention tests.
    pub async fn backdate(&self, key: &str, generation: u64, updated: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(versions) = inner.objects.get_mut(key) {
            for v in versions.iter_mut() {
                if v.generation == generation {
                    v.updated = updated;
                }
            }
        }
    }

    pub async fn live_keys(&self) -> Vec<String> {
        self.inner.lock().await.objects.keys().cloned().collect()
    }

    pub async fn version_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .await
            .objects
            .get(key)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

fn meta_of(key: &str, version: &StoredVersion) -> ObjectMeta {
    ObjectMeta {
        key: key.to_string(),
        size: version.data.len() as u64,
        updated: version.updated,
        content_hash: version.content_hash,
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .objects
            .iter()
            .filter_map(|(key, versions)| versions.first().map(|v| meta_of(key, v)))
            .collect())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .objects
            .get(key)
            .and_then(|versions| versions.first())
            .map(|v| meta_of(key, v)))
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let mut inner = self.inner.lock().await;
        if inner.get_failures > 0 {
            inner.get_failures -= 1;
            return Err(SyncError::Transient(format!("injected get failure: {key}")));
        }
        inner
            .objects
            .get(key)
            .and_then(|versions| versions.first())
            .map(|v| v.data.clone())
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.put_failures > 0 {
            inner.put_failures -= 1;
            return Err(SyncError::Transient(format!("injected put failure: {key}")));
        }
        inner.next_generation += 1;
        let version = StoredVersion {
            generation: inner.next_generation,
            data,
            updated: Utc::now(),
            content_hash: opts.content_hash,
        };
        inner
            .objects
            .entry(key.to_string())
            .or_default()
            .insert(0, version);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    async fn list_versions(&self) -> Result<Vec<VersionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .objects
            .iter()
            .flat_map(|(key, versions)| {
                versions.iter().map(move |v| VersionRecord {
                    key: key.clone(),
                    generation: v.generation,
                    size: v.data.len() as u64,
                    updated: v.updated,
                })
            })
            .collect())
    }

    async fn delete_version(&self, key: &str, generation: u64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let versions = inner
            .objects
            .get_mut(key)
            .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
        let before = versions.len();
        versions.retain(|v| v.generation != generation);
        if versions.len() == before {
            return Err(SyncError::NotFound(format!("{key}#{generation}")));
        }
        if versions.is_empty() {
            inner.objects.remove(key);
        }
        Ok(())
    }
}
