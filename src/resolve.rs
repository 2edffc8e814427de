//! Conflict resolver.
//!
//! A conflict always resolves to a concrete transfer overwriting one side,
//! never a skip: leaving both divergent copies in place would let the same
//! conflict resurface every cycle.

use serde::{Deserialize, Serialize};

use crate::events::Winner;
use crate::manifest::ManifestEntry;

/// Whole-file conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// The local copy overwrites the remote.
    LocalWins,
    /// The remote copy overwrites the local.
    RemoteWins,
    /// The side with the strictly newer mtime wins; ties go to remote.
    #[default]
    NewestWins,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::LocalWins => "local-wins",
            Strategy::RemoteWins => "remote-wins",
            Strategy::NewestWins => "newest-wins",
        }
    }
}

/// Pick the winning side for a conflicted path. Deterministic for
/// identical inputs; no randomness, no clock reads.
pub fn resolve(strategy: Strategy, local: &ManifestEntry, remote: &ManifestEntry) -> Winner {
    match strategy {
        Strategy::LocalWins => Winner::Local,
        Strategy::RemoteWins => Winner::Remote,
        Strategy::NewestWins => {
            if local.modified > remote.modified {
                Winner::Local
            } else {
                Winner::Remote
            }
        }
    }
}
