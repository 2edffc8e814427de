//! Engine configuration.
//!
//! All knobs live in a single serde-friendly value struct so the caller can
//! deserialize it from its own config file format. Every field has a
//! default; `SyncConfig::default()` is a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compress;
use crate::prune::RetentionPolicy;
use crate::resolve::Strategy;
use crate::usage::PricingModel;

/// Directory under the local root holding persisted engine state
/// (ancestor manifest, sync history). Always excluded from scans.
pub const DEFAULT_STATE_DIR: &str = ".bucketsync";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Glob patterns a file must match to be scanned. Empty = everything.
    pub include: Vec<String>,

    /// Glob patterns to exclude. Matching directories are never descended
    /// into, so a pattern like `node_modules` cuts the whole subtree.
    pub exclude: Vec<String>,

    /// Files larger than this are compressed before upload.
    pub compression_threshold: u64,

    /// zstd level used on push.
    pub compression_level: i32,

    /// Remote-name suffix marking a compressed object.
    pub compression_suffix: String,

    /// Maximum number of concurrent transfers.
    pub concurrency: usize,

    /// Total attempts per transfer (1 initial + retries) for transient errors.
    pub retry_attempts: u32,

    /// Base delay for exponential backoff, in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Deadline per individual network operation, in seconds.
    pub op_timeout_secs: u64,

    /// Re-read remote metadata after upload and verify the stored digest.
    pub verify_uploads: bool,

    /// Conflict resolution strategy for `sync`.
    pub strategy: Strategy,

    /// Version retention rules applied by `prune`.
    pub retention: RetentionPolicy,

    /// Pricing constants for `usage` cost estimates.
    pub pricing: PricingModel,

    /// How many largest objects the usage report lists.
    pub top_objects: usize,

    /// Name of the state directory under the local root.
    pub state_dir: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            compression_threshold: 4096,
            compression_level: compress::DEFAULT_LEVEL,
            compression_suffix: compress::DEFAULT_SUFFIX.to_string(),
            concurrency: default_concurrency(),
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            op_timeout_secs: 30,
            verify_uploads: true,
            strategy: Strategy::default(),
            retention: RetentionPolicy::default(),
            pricing: PricingModel::default(),
            top_objects: 10,
            state_dir: DEFAULT_STATE_DIR.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

/// Default transfer parallelism: one worker per core, kept in a small band
/// to avoid tripping provider rate limits.
fn default_concurrency() -> usize {
    num_cpus::get().clamp(4, 16)
}
