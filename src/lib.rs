//! bucketsync - bi-directional sync between a local tree and an object-storage bucket.
//!
//! Content-addressed change detection (BLAKE3 over uncompressed bytes), a
//! three-way diff against the last-synced ancestor manifest, transparent
//! zstd compression above a size threshold, version-based retention
//! pruning, and configurable whole-file conflict resolution.
//!
//! The storage client is injected via the [`store::ObjectStore`] trait; a
//! pre-authenticated handle comes from the caller. Typical use:
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use bucketsync::{SyncConfig, SyncEngine};
//! use bucketsync::store::MemoryStore;
//!
//! # async fn run() -> bucketsync::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = SyncEngine::new(store, SyncConfig::default());
//! let report = engine.sync(Path::new("/data/docs")).await?;
//! println!("pushed {} pulled {}", report.pushed, report.pulled);
//! # Ok(())
//! # }
//! ```

pub mod compress;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod hash;
pub mod history;
pub mod manifest;
pub mod plan;
pub mod prune;
pub mod resolve;
pub mod scan;
pub mod store;
pub mod transfer;
pub mod usage;

pub use config::SyncConfig;
pub use engine::{
    CancelFlag, PathError, PruneReport, PullReport, PushReport, SyncEngine, SyncReport,
};
pub use error::{Result, SyncError};
pub use events::{Event, Winner};
pub use hash::ContentHash;
pub use manifest::{Manifest, ManifestEntry};
pub use plan::{ActionKind, SyncAction, SyncPlan};
pub use prune::RetentionPolicy;
pub use resolve::Strategy;
pub use usage::{PricingModel, UsageReport};
