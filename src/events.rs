//! Typed event stream for per-path outcomes.
//!
//! The engine reports progress as messages on an injected channel instead
//! of writing to any logging sink itself. Callers subscribe by handing a
//! `tokio::sync::mpsc::UnboundedSender` to the engine; emission is
//! best-effort and a dropped receiver is ignored.

use tokio::sync::mpsc;

/// Which side won a conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Local => "local",
            Winner::Remote => "remote",
        }
    }
}

/// One per-path outcome inside a sync/prune cycle.
#[derive(Debug, Clone)]
pub enum Event {
    PushSuccess {
        path: String,
        compressed: bool,
        bytes: u64,
    },
    PushError {
        path: String,
        error: String,
    },
    PullSuccess {
        path: String,
        bytes: u64,
    },
    PullError {
        path: String,
        error: String,
    },
    /// Pull skipped because the local copy's mtime is newer than the remote's.
    PullSkippedNewer {
        path: String,
    },
    ConflictResolved {
        path: String,
        winner: Winner,
    },
    PruneDeleted {
        path: String,
        generation: u64,
        age_days: i64,
        size: u64,
    },
    /// Pruning refused to delete the last live version of a path.
    PruneRefused {
        path: String,
    },
}

/// Cloneable emitter handle held by the engine and its workers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventBus {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            // Receiver may be gone; reporting must never fail an operation.
            let _ = tx.send(event);
        }
    }
}
