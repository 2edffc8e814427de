//! Transfer engine.
//!
//! Executes the per-path push and pull actions produced by the planner.
//! Push compresses above the configured threshold and verifies the stored
//! digest after upload; pull decompresses transparently, verifies the
//! downloaded content, and writes through a temp file so a failed or
//! cancelled transfer never leaves a half-written local file.
//!
//! Transient failures retry with exponential backoff (default 3 attempts:
//! 500ms, 1s). Every network call runs under the per-operation timeout, so
//! one slow object cannot stall a whole cycle.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::compress;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::hash::ContentHash;
use crate::manifest::ManifestEntry;
use crate::store::{ObjectStore, PutOptions};

/// Shared context handed to transfer workers.
#[derive(Clone)]
pub struct TransferCtx {
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<SyncConfig>,
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub remote_key: String,
    pub compressed: bool,
    /// Bytes actually sent (post-compression).
    pub bytes_uploaded: u64,
}

#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub bytes_written: u64,
    /// Local-side manifest entry for the freshly written file.
    pub entry: ManifestEntry,
}

/// Remote object name for a logical path.
pub fn remote_key(logical: &str, compressed: bool, suffix: &str) -> String {
    if compressed {
        format!("{logical}{suffix}")
    } else {
        logical.to_string()
    }
}

/// Upload one local file.
///
/// The stored digest is always the hash of the uncompressed bytes; after
/// upload the remote metadata is re-read and a mismatch is an integrity
/// failure, never a silent success.
pub async fn push_one(ctx: &TransferCtx, root: &Path, entry: &ManifestEntry) -> Result<PushOutcome> {
    let abs = root.join(&entry.path);
    let data = tokio::fs::read(&abs).await?;

    // Hash and compress off the async threads.
    let level = ctx.config.compression_level;
    let threshold = ctx.config.compression_threshold;
    let (hash, body, compressed) = tokio::task::spawn_blocking(
        move || -> Result<(ContentHash, Bytes, bool)> {
            let hash = ContentHash::from_bytes(&data);
            if data.len() as u64 > threshold {
                let packed = compress::compress(&data, level)?;
                Ok((hash, Bytes::from(packed), true))
            } else {
                Ok((hash, Bytes::from(data), false))
            }
        },
    )
    .await
    .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

    let key = remote_key(&entry.path, compressed, &ctx.config.compression_suffix);
    let bytes_uploaded = body.len() as u64;

    with_retry(&ctx.config, "upload", || {
        let body = body.clone();
        let key = key.as_str();
        let store = &ctx.store;
        let timeout = ctx.config.op_timeout();
        async move {
            let opts = PutOptions {
                content_hash: Some(hash),
            };
            timed(timeout, "upload", store.put(key, body, opts)).await
        }
    })
    .await?;

    // A path that crossed the compression threshold leaves its old remote
    // form behind; remove it so the logical path stays single-keyed.
    let other_key = remote_key(&entry.path, !compressed, &ctx.config.compression_suffix);
    match timed(ctx.config.op_timeout(), "delete", ctx.store.delete(&other_key)).await {
        Ok(()) => debug!(key = %other_key, "removed stale counterpart object"),
        Err(SyncError::NotFound(_)) => {}
        Err(e) => warn!(key = %other_key, error = %e, "failed to remove stale counterpart"),
    }

    if ctx.config.verify_uploads {
        let meta = with_retry(&ctx.config, "verify", || {
            let key = key.as_str();
            let store = &ctx.store;
            let timeout = ctx.config.op_timeout();
            async move { timed(timeout, "verify", store.head(key)).await }
        })
        .await?;

        match meta.and_then(|m| m.content_hash) {
            Some(stored) if stored != hash => {
                return Err(SyncError::Integrity(format!(
                    "post-upload digest mismatch for {key}: expected {hash}, stored {stored}"
                )));
            }
            Some(_) => {}
            None => {
                return Err(SyncError::Integrity(format!(
                    "object {key} missing or without digest after upload"
                )));
            }
        }
    }

    Ok(PushOutcome {
        remote_key: key,
        compressed,
        bytes_uploaded,
    })
}

/// Download one remote entry into the local tree.
///
/// Writes to `<path>.part` and renames on success; on any failure the
/// previous local state is untouched so the next cycle can retry.
pub async fn pull_one(ctx: &TransferCtx, root: &Path, entry: &ManifestEntry) -> Result<PullOutcome> {
    let abs = validate_local_path(root, &entry.path)?;
    let key = remote_key(&entry.path, entry.compressed, &ctx.config.compression_suffix);

    let data = with_retry(&ctx.config, "download", || {
        let key = key.as_str();
        let store = &ctx.store;
        let timeout = ctx.config.op_timeout();
        async move { timed(timeout, "download", store.get(key)).await }
    })
    .await?;

    let compressed = entry.compressed;
    let expected = entry.hash;
    let body = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let body = if compressed {
            compress::decompress(&data)?
        } else {
            data.to_vec()
        };
        let actual = ContentHash::from_bytes(&body);
        if actual != expected {
            return Err(SyncError::Integrity(format!(
                "downloaded content digest mismatch: expected {expected}, got {actual}"
            )));
        }
        Ok(body)
    })
    .await
    .map_err(|e| SyncError::Io(std::io::Error::other(e)))??;

    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = abs
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| SyncError::InvalidPath {
            path: entry.path.clone(),
            reason: "no file name".to_string(),
        })?;
    let temp = abs.with_file_name(format!("{file_name}.part"));

    let bytes_written = body.len() as u64;
    tokio::fs::write(&temp, &body).await?;
    tokio::fs::rename(&temp, &abs).await?;

    let metadata = tokio::fs::metadata(&abs).await?;
    let modified = metadata
        .modified()
        .map(chrono::DateTime::from)
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(PullOutcome {
        bytes_written,
        entry: ManifestEntry {
            path: entry.path.clone(),
            hash: expected,
            size: bytes_written,
            modified,
            compressed: false,
        },
    })
}

/// Run an async operation with bounded exponential backoff.
///
/// Only transient failures retry; integrity and configuration errors
/// surface immediately.
pub async fn with_retry<F, Fut, T>(config: &SyncConfig, operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.retry_attempts.max(1);
    let mut last_error: Option<SyncError> = None;

    for attempt in 0..attempts {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt + 1 < attempts => {
                let delay = config.retry_base_delay() * 2u32.pow(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error
        .unwrap_or_else(|| SyncError::Transient(format!("retries exhausted for {operation}"))))
}

/// Apply the per-operation deadline to one network call.
pub(crate) async fn timed<T, F>(timeout: std::time::Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(operation.to_string())),
    }
}

/// Validate that a logical path is safe to write under `root`.
fn validate_local_path(root: &Path, logical: &str) -> Result<PathBuf> {
    if logical.is_empty() {
        return Err(SyncError::InvalidPath {
            path: logical.to_string(),
            reason: "empty path".to_string(),
        });
    }

    let rel = Path::new(logical);
    if rel.is_absolute() {
        return Err(SyncError::InvalidPath {
            path: logical.to_string(),
            reason: "absolute path".to_string(),
        });
    }

    for component in rel.components() {
        match component {
            Component::ParentDir => {
                return Err(SyncError::InvalidPath {
                    path: logical.to_string(),
                    reason: "path traversal".to_string(),
                });
            }
            Component::Prefix(_) => {
                return Err(SyncError::InvalidPath {
                    path: logical.to_string(),
                    reason: "prefixed path".to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(root.join(rel))
}
