//! Sync engine: the public operations.
//!
//! Wires the scanner, fetcher, planner, resolver, transfer engine, and
//! pruner into the five operations exposed to the surrounding scheduler
//! or CLI layer: `push`, `pull`, `sync`, `prune`, `usage`.
//!
//! Per-path failures never abort an operation — they are collected into
//! the returned report so partial success is always distinguishable from
//! total success. Configuration failures (missing local root, unreachable
//! bucket) abort before any transfer starts.
//!
//! Conflict handling has exactly one authoritative rule: the hash-based
//! three-way diff used by [`SyncEngine::sync`]. The mtime-based
//! "local is newer" skip applies only to the standalone
//! [`SyncEngine::pull`], which runs without an ancestor manifest.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::{Event, EventBus, Winner};
use crate::fetch;
use crate::history::{self, SyncRecord, SyncStatus};
use crate::manifest::{Manifest, ManifestEntry};
use crate::plan::{self, ActionKind};
use crate::prune::{select_prunable, RetentionPolicy};
use crate::resolve::{resolve, Strategy};
use crate::scan::Scanner;
use crate::store::ObjectStore;
use crate::transfer::{self, timed, with_retry, TransferCtx};
use crate::usage::{self, UsageReport};

/// File name of the persisted ancestor manifest inside the state dir.
const ANCESTOR_FILE: &str = "last-sync.list";

/// File name of the sync history log inside the state dir.
const HISTORY_FILE: &str = "history.json";

/// One per-path failure, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathError {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct PushReport {
    pub pushed: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    pub errors: Vec<PathError>,
}

#[derive(Debug, Clone, Default)]
pub struct PullReport {
    pub pulled: usize,
    pub skipped: usize,
    pub errors: Vec<PathError>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub errors: Vec<PathError>,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub deleted: usize,
    pub freed_bytes: u64,
    pub errors: Vec<PathError>,
}

/// Cooperative cancellation handle.
///
/// Cancelling stops the engine from scheduling new transfers; in-flight
/// transfers complete or fail cleanly on their own.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A concrete transfer to execute, after planning and conflict resolution.
enum Job {
    Push(ManifestEntry),
    Pull(ManifestEntry),
}

impl Job {
    fn path(&self) -> &str {
        match self {
            Job::Push(e) | Job::Pull(e) => &e.path,
        }
    }
}

enum JobOutcome {
    Pushed {
        entry: ManifestEntry,
        bytes: u64,
    },
    Pulled {
        entry: ManifestEntry,
    },
    Failed {
        path: String,
        error: SyncError,
    },
    /// Never scheduled because the cycle was cancelled.
    Cancelled {
        path: String,
    },
}

/// Bi-directional sync engine over one local root and one bucket.
///
/// Holds no global state: manifests are rebuilt on every invocation and
/// the only thing surviving between runs is the ancestor manifest under
/// the state directory. Multiple engines may coexist in one process.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    config: Arc<SyncConfig>,
    events: EventBus,
    cancel: CancelFlag,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            events: EventBus::disabled(),
            cancel: CancelFlag::default(),
        }
    }

    /// Subscribe the caller to the per-path event stream.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<Event>) -> Self {
        self.events = EventBus::new(tx);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Handle for cancelling in-progress operations from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Upload local files whose content is absent from the bucket.
    ///
    /// Content already present remotely (same digest) is skipped no matter
    /// what the timestamps say. `extra_excludes` stack on the configured
    /// exclude patterns.
    pub async fn push(&self, local_root: &Path, extra_excludes: &[String]) -> Result<PushReport> {
        let (local, remote) = tokio::join!(
            self.scan_local(local_root, extra_excludes),
            self.fetch_remote()
        );
        let (local, remote) = (local?, remote?);

        let mut report = PushReport::default();
        let mut jobs = Vec::new();
        for entry in local.entries() {
            match remote.get(&entry.path) {
                Some(r) if r.hash == entry.hash => report.skipped += 1,
                _ => jobs.push(Job::Push(entry.clone())),
            }
        }

        for outcome in self.run_jobs(local_root, jobs).await {
            match outcome {
                JobOutcome::Pushed { bytes, .. } => {
                    report.pushed += 1;
                    report.bytes_transferred += bytes;
                }
                JobOutcome::Failed { path, error } => report.errors.push(PathError {
                    path,
                    error: error.to_string(),
                }),
                JobOutcome::Cancelled { .. } => report.skipped += 1,
                JobOutcome::Pulled { .. } => unreachable!("push scheduled no pulls"),
            }
        }

        info!(
            pushed = report.pushed,
            skipped = report.skipped,
            errors = report.errors.len(),
            bytes = report.bytes_transferred,
            "push complete"
        );
        Ok(report)
    }

    /// Download remote objects into the local tree.
    ///
    /// Runs without an ancestor manifest, so it applies the documented
    /// mtime heuristic: a local copy with a newer mtime than the remote is
    /// left alone and reported via [`Event::PullSkippedNewer`]. Content
    /// already identical (same digest) is skipped regardless of mtimes.
    pub async fn pull(&self, local_root: &Path) -> Result<PullReport> {
        if !local_root.exists() {
            tokio::fs::create_dir_all(local_root).await?;
        }

        let (local, remote) = tokio::join!(self.scan_local(local_root, &[]), self.fetch_remote());
        let (local, remote) = (local?, remote?);

        let mut report = PullReport::default();
        let mut jobs = Vec::new();
        for entry in remote.entries() {
            match local.get(&entry.path) {
                Some(l) if l.hash == entry.hash => report.skipped += 1,
                Some(l) if l.modified > entry.modified => {
                    debug!(path = %entry.path, "local copy is newer, skipping pull");
                    self.events.emit(Event::PullSkippedNewer {
                        path: entry.path.clone(),
                    });
                    report.skipped += 1;
                }
                _ => jobs.push(Job::Pull(entry.clone())),
            }
        }

        for outcome in self.run_jobs(local_root, jobs).await {
            match outcome {
                JobOutcome::Pulled { .. } => report.pulled += 1,
                JobOutcome::Failed { path, error } => report.errors.push(PathError {
                    path,
                    error: error.to_string(),
                }),
                JobOutcome::Cancelled { .. } => report.skipped += 1,
                JobOutcome::Pushed { .. } => unreachable!("pull scheduled no pushes"),
            }
        }

        info!(
            pulled = report.pulled,
            skipped = report.skipped,
            errors = report.errors.len(),
            "pull complete"
        );
        Ok(report)
    }

    /// Full bidirectional cycle using the configured conflict strategy.
    pub async fn sync(&self, local_root: &Path) -> Result<SyncReport> {
        self.sync_with_strategy(local_root, self.config.strategy).await
    }

    /// Full bidirectional cycle: three-way diff against the persisted
    /// ancestor, conflict resolution, bounded-parallel transfers, then
    /// atomic persistence of the new ancestor manifest.
    pub async fn sync_with_strategy(
        &self,
        local_root: &Path,
        strategy: Strategy,
    ) -> Result<SyncReport> {
        let started = Utc::now();
        let ancestor_path = self.state_path(local_root, ANCESTOR_FILE);

        let (local, remote) = tokio::join!(self.scan_local(local_root, &[]), self.fetch_remote());
        let (local, remote) = (local?, remote?);
        let ancestor = Manifest::load_or_default(&ancestor_path)?;

        let sync_plan = plan::plan(&local, &remote, &ancestor);

        let mut report = SyncReport::default();
        let mut jobs = Vec::new();
        let mut skip_paths: Vec<String> = Vec::new();

        for action in &sync_plan.actions {
            match action.kind {
                ActionKind::Skip => {
                    report.skipped += 1;
                    skip_paths.push(action.path.clone());
                }
                ActionKind::Push => {
                    if let Some(entry) = local.get(&action.path) {
                        jobs.push(Job::Push(entry.clone()));
                    }
                }
                ActionKind::Pull => {
                    if let Some(entry) = remote.get(&action.path) {
                        jobs.push(Job::Pull(entry.clone()));
                    }
                }
                ActionKind::Conflict => {
                    let (l, r) = match (local.get(&action.path), remote.get(&action.path)) {
                        (Some(l), Some(r)) => (l, r),
                        _ => continue,
                    };
                    report.conflicts += 1;
                    let winner = resolve(strategy, l, r);
                    self.events.emit(Event::ConflictResolved {
                        path: action.path.clone(),
                        winner,
                    });
                    info!(path = %action.path, winner = winner.as_str(), "conflict resolved");
                    match winner {
                        Winner::Local => jobs.push(Job::Push(l.clone())),
                        Winner::Remote => jobs.push(Job::Pull(r.clone())),
                    }
                }
            }
        }

        // Execute transfers, then fold outcomes into the next ancestor:
        // synced paths take their fresh entry, failed and cancelled paths
        // keep their old ancestor record so the next cycle retries them.
        let mut next_ancestor = Manifest::new();
        for path in &skip_paths {
            if let Some(entry) = local.get(path) {
                next_ancestor.insert(entry.clone());
            }
        }

        for outcome in self.run_jobs(local_root, jobs).await {
            match outcome {
                JobOutcome::Pushed { entry, .. } => {
                    report.pushed += 1;
                    next_ancestor.insert(entry);
                }
                JobOutcome::Pulled { entry } => {
                    report.pulled += 1;
                    next_ancestor.insert(entry);
                }
                JobOutcome::Failed { path, error } => {
                    if let Some(old) = ancestor.get(&path) {
                        next_ancestor.insert(old.clone());
                    }
                    report.errors.push(PathError {
                        path,
                        error: error.to_string(),
                    });
                }
                JobOutcome::Cancelled { path } => {
                    if let Some(old) = ancestor.get(&path) {
                        next_ancestor.insert(old.clone());
                    }
                    report.skipped += 1;
                }
            }
        }

        next_ancestor.save(&ancestor_path)?;

        let record = SyncRecord {
            started,
            finished: Utc::now(),
            pushed: report.pushed,
            pulled: report.pulled,
            conflicts: report.conflicts,
            skipped: report.skipped,
            errors: report.errors.len(),
            status: if report.errors.is_empty() {
                SyncStatus::Success
            } else {
                SyncStatus::Partial
            },
        };
        if let Err(e) = history::append(&self.state_path(local_root, HISTORY_FILE), record) {
            warn!(error = %e, "failed to append sync history");
        }

        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            conflicts = report.conflicts,
            skipped = report.skipped,
            errors = report.errors.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Delete remote versions that fall outside the retention policy.
    ///
    /// Runs strictly after any transfers the caller started have returned;
    /// the engine never interleaves pruning with an in-flight push. The
    /// sole newest version of a path is never deleted.
    pub async fn prune(&self, policy: RetentionPolicy) -> Result<PruneReport> {
        let versions = fetch::fetch_versions(
            self.store.as_ref(),
            &self.config.compression_suffix,
            self.config.op_timeout(),
        )
        .await?;
        let now = Utc::now();

        let mut candidates = Vec::new();
        for (logical, records) in &versions {
            let selection = select_prunable(records, &policy, now);
            if selection.refused_newest {
                warn!(path = %logical, "refusing to prune the last live version");
                self.events.emit(Event::PruneRefused {
                    path: logical.clone(),
                });
            }
            for record in selection.candidates {
                candidates.push((logical.clone(), record));
            }
        }

        let mut report = PruneReport::default();
        let results = stream::iter(candidates)
            .map(|(logical, record)| {
                let store = self.store.clone();
                let config = self.config.clone();
                async move {
                    let result = with_retry(&config, "delete-version", || {
                        let store = &store;
                        let key = record.key.as_str();
                        let generation = record.generation;
                        let op_timeout = config.op_timeout();
                        async move {
                            timed(
                                op_timeout,
                                "delete-version",
                                store.delete_version(key, generation),
                            )
                            .await
                        }
                    })
                    .await;
                    (logical, record, result)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await;

        for (logical, record, result) in results {
            match result {
                Ok(()) => {
                    report.deleted += 1;
                    report.freed_bytes += record.size;
                    self.events.emit(Event::PruneDeleted {
                        path: logical,
                        generation: record.generation,
                        age_days: now.signed_duration_since(record.updated).num_days(),
                        size: record.size,
                    });
                }
                Err(error) => report.errors.push(PathError {
                    path: logical,
                    error: error.to_string(),
                }),
            }
        }

        info!(
            deleted = report.deleted,
            freed_bytes = report.freed_bytes,
            errors = report.errors.len(),
            "prune complete"
        );
        Ok(report)
    }

    /// Aggregate live-object sizes into a usage and cost report.
    pub async fn usage(&self) -> Result<UsageReport> {
        let metas = with_retry(&self.config, "list", || {
            let store = &self.store;
            let op_timeout = self.config.op_timeout();
            async move { timed(op_timeout, "list", store.list()).await }
        })
        .await?;

        Ok(usage::estimate(
            &metas,
            &self.config.pricing,
            self.config.top_objects,
        ))
    }

    /// Persisted sync history for this local root, oldest first.
    pub fn history(&self, local_root: &Path) -> Vec<SyncRecord> {
        history::load(&self.state_path(local_root, HISTORY_FILE))
    }

    fn state_path(&self, local_root: &Path, file: &str) -> PathBuf {
        local_root.join(&self.config.state_dir).join(file)
    }

    async fn scan_local(&self, root: &Path, extra_excludes: &[String]) -> Result<Manifest> {
        let scanner = Scanner::new(root, &self.config.state_dir)
            .include(&self.config.include)?
            .exclude(&self.config.exclude)?
            .exclude(extra_excludes)?;
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
    }

    async fn fetch_remote(&self) -> Result<Manifest> {
        fetch::fetch_manifest(
            self.store.as_ref(),
            &self.config.compression_suffix,
            self.config.op_timeout(),
        )
        .await
    }

    /// Execute transfers for independent paths with a bounded worker pool.
    ///
    /// The plan carries exactly one action per path, so transfers for the
    /// same path are never in flight together. Cancellation is checked
    /// before each job starts; in-flight jobs run to completion.
    async fn run_jobs(&self, root: &Path, jobs: Vec<Job>) -> Vec<JobOutcome> {
        let ctx = TransferCtx {
            store: self.store.clone(),
            config: self.config.clone(),
        };

        stream::iter(jobs)
            .map(|job| {
                let ctx = ctx.clone();
                let root = root.to_path_buf();
                let cancel = self.cancel.clone();
                let events = self.events.clone();
                async move {
                    if cancel.is_cancelled() {
                        return JobOutcome::Cancelled {
                            path: job.path().to_string(),
                        };
                    }
                    match job {
                        Job::Push(entry) => match transfer::push_one(&ctx, &root, &entry).await {
                            Ok(outcome) => {
                                events.emit(Event::PushSuccess {
                                    path: entry.path.clone(),
                                    compressed: outcome.compressed,
                                    bytes: outcome.bytes_uploaded,
                                });
                                JobOutcome::Pushed {
                                    entry,
                                    bytes: outcome.bytes_uploaded,
                                }
                            }
                            Err(error) => {
                                events.emit(Event::PushError {
                                    path: entry.path.clone(),
                                    error: error.to_string(),
                                });
                                JobOutcome::Failed {
                                    path: entry.path,
                                    error,
                                }
                            }
                        },
                        Job::Pull(entry) => match transfer::pull_one(&ctx, &root, &entry).await {
                            Ok(outcome) => {
                                events.emit(Event::PullSuccess {
                                    path: entry.path.clone(),
                                    bytes: outcome.bytes_written,
                                });
                                JobOutcome::Pulled {
                                    entry: outcome.entry,
                                }
                            }
                            Err(error) => {
                                events.emit(Event::PullError {
                                    path: entry.path.clone(),
                                    error: error.to_string(),
                                });
                                JobOutcome::Failed {
                                    path: entry.path,
                                    error,
                                }
                            }
                        },
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}
