//! Remote manifest fetcher.
//!
//! Lists bucket objects into a [`Manifest`] keyed by logical path: an
//! object stored under `foo.json.zst` is recorded as `foo.json` with
//! `compressed = true`, so a local `foo.json` and its compressed remote
//! counterpart are recognized as the same entity.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::compress;
use crate::error::{Result, SyncError};
use crate::hash::ContentHash;
use crate::manifest::{Manifest, ManifestEntry};
use crate::store::{ObjectStore, VersionRecord};
use crate::transfer::timed;

/// Split a raw remote key into its logical path and compression flag.
pub fn split_key<'a>(key: &'a str, suffix: &str) -> (&'a str, bool) {
    if suffix.is_empty() {
        return (key, false);
    }
    match key.strip_suffix(suffix) {
        Some(stripped) if !stripped.is_empty() => (stripped, true),
        _ => (key, false),
    }
}

/// Build the remote-side manifest from the bucket's live objects.
///
/// An empty bucket yields an empty manifest; provider errors propagate.
/// Entries carry the stored (on-wire) size; hashes always describe the
/// uncompressed content.
pub async fn fetch_manifest(
    store: &dyn ObjectStore,
    suffix: &str,
    op_timeout: Duration,
) -> Result<Manifest> {
    let metas = timed(op_timeout, "list", store.list()).await?;

    let mut manifest = Manifest::new();
    for meta in metas {
        let (logical, compressed) = split_key(&meta.key, suffix);
        let logical = logical.to_string();

        let hash = match meta.content_hash {
            Some(h) => h,
            None => {
                // Object written by another tool; fall back to hashing the body.
                debug!(key = %meta.key, "no metadata digest, hashing remote object");
                let data = timed(op_timeout, "get", store.get(&meta.key)).await?;
                tokio::task::spawn_blocking(move || -> Result<ContentHash> {
                    let body = if compressed {
                        compress::decompress(&data)?
                    } else {
                        data.to_vec()
                    };
                    Ok(ContentHash::from_bytes(&body))
                })
                .await
                .map_err(|e| SyncError::Storage(format!("hash task failed: {e}")))??
            }
        };

        manifest.insert(ManifestEntry {
            path: logical,
            hash,
            size: meta.size,
            modified: meta.updated,
            compressed,
        });
    }

    Ok(manifest)
}

/// Full version history per logical path, newest-first, for pruning.
pub async fn fetch_versions(
    store: &dyn ObjectStore,
    suffix: &str,
    op_timeout: Duration,
) -> Result<HashMap<String, Vec<VersionRecord>>> {
    let records = timed(op_timeout, "list-versions", store.list_versions()).await?;

    let mut by_path: HashMap<String, Vec<VersionRecord>> = HashMap::new();
    for record in records {
        let (logical, _) = split_key(&record.key, suffix);
        by_path.entry(logical.to_string()).or_default().push(record);
    }

    for versions in by_path.values_mut() {
        versions.sort_by(|a, b| {
            b.updated
                .cmp(&a.updated)
                .then(b.generation.cmp(&a.generation))
        });
    }

    Ok(by_path)
}
