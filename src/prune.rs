//! Retention and pruning.
//!
//! Selection is pure: given a path's version history (newest-first) and a
//! policy, compute which versions are deletable. The engine performs the
//! actual deletes, strictly after all transfers of a cycle have finished
//! so an in-flight upload can never be mistaken for a stale version.
//!
//! Deletion rule, per path: the first `max_versions` records are retained
//! unconditionally; records beyond that rank are deleted only when older
//! than `max_age_days`. The single newest version of a path is never
//! deleted, even with `max_versions = 0`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::VersionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Number of most-recent versions kept regardless of age.
    pub max_versions: usize,
    /// Versions beyond `max_versions` rank are deleted once older than this.
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_versions: 5,
            max_age_days: 30,
        }
    }
}

/// Deletable versions for one path, plus whether the safety invariant had
/// to refuse the newest version.
#[derive(Debug, Default)]
pub struct PruneSelection {
    pub candidates: Vec<VersionRecord>,
    /// True when the policy alone would have deleted the path's sole
    /// newest version; that record is withheld from `candidates`.
    pub refused_newest: bool,
}

/// Select deletable versions for one path.
pub fn select_prunable(
    versions: &[VersionRecord],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> PruneSelection {
    let mut ordered: Vec<VersionRecord> = versions.to_vec();
    ordered.sort_by(|a, b| {
        b.updated
            .cmp(&a.updated)
            .then(b.generation.cmp(&a.generation))
    });

    let max_age = Duration::days(i64::from(policy.max_age_days));
    let mut selection = PruneSelection::default();

    for (rank, version) in ordered.into_iter().enumerate() {
        if rank < policy.max_versions {
            continue;
        }
        if now.signed_duration_since(version.updated) <= max_age {
            continue;
        }
        if rank == 0 {
            // max_versions = 0 and the newest version is past the age
            // limit: refuse rather than leave the path with zero copies.
            selection.refused_newest = true;
            continue;
        }
        selection.candidates.push(version);
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(gen: u64, size: u64, age_days: i64, now: DateTime<Utc>) -> VersionRecord {
        VersionRecord {
            key: "a.json".to_string(),
            generation: gen,
            size,
            updated: now - Duration::days(age_days),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn test_two_kept_three_old_ones_deleted() {
        // Policy {max_versions: 2, max_age_days: 7}; 5 versions, the 2
        // newest within 7 days, the 3 oldest beyond it.
        let now = now();
        let versions = vec![
            version(5, 100, 1, now),
            version(4, 200, 3, now),
            version(3, 300, 10, now),
            version(2, 400, 20, now),
            version(1, 500, 30, now),
        ];
        let policy = RetentionPolicy {
            max_versions: 2,
            max_age_days: 7,
        };

        let selection = select_prunable(&versions, &policy, now);

        assert_eq!(selection.candidates.len(), 3);
        assert!(!selection.refused_newest);
        let freed: u64 = selection.candidates.iter().map(|v| v.size).sum();
        assert_eq!(freed, 300 + 400 + 500);
    }

    #[test]
    fn test_young_versions_beyond_rank_are_kept() {
        // Beyond max_versions rank but not yet past max_age: retained.
        let now = now();
        let versions = vec![
            version(3, 10, 1, now),
            version(2, 10, 2, now),
            version(1, 10, 3, now),
        ];
        let policy = RetentionPolicy {
            max_versions: 1,
            max_age_days: 7,
        };

        let selection = select_prunable(&versions, &policy, now);
        assert!(selection.candidates.is_empty());
    }

    #[test]
    fn test_never_deletes_sole_newest_version() {
        let now = now();
        let versions = vec![version(1, 10, 100, now)];
        let policy = RetentionPolicy {
            max_versions: 0,
            max_age_days: 7,
        };

        let selection = select_prunable(&versions, &policy, now);

        assert!(selection.candidates.is_empty());
        assert!(selection.refused_newest);
    }

    #[test]
    fn test_max_versions_zero_still_prunes_older_ranks() {
        let now = now();
        let versions = vec![version(2, 10, 100, now), version(1, 20, 200, now)];
        let policy = RetentionPolicy {
            max_versions: 0,
            max_age_days: 7,
        };

        let selection = select_prunable(&versions, &policy, now);

        // Rank 1 deleted, rank 0 refused but kept.
        assert_eq!(selection.candidates.len(), 1);
        assert_eq!(selection.candidates[0].generation, 1);
        assert!(selection.refused_newest);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let now = now();
        let versions = vec![
            version(3, 10, 1, now),
            version(2, 10, 10, now),
            version(1, 10, 20, now),
        ];
        let policy = RetentionPolicy {
            max_versions: 1,
            max_age_days: 7,
        };

        let first = select_prunable(&versions, &policy, now);
        assert_eq!(first.candidates.len(), 2);

        // Apply the deletes, then select again: nothing left to prune.
        let deleted: Vec<u64> = first.candidates.iter().map(|v| v.generation).collect();
        let remaining: Vec<VersionRecord> = versions
            .into_iter()
            .filter(|v| !deleted.contains(&v.generation))
            .collect();

        let second = select_prunable(&remaining, &policy, now);
        assert!(second.candidates.is_empty());
    }

    #[test]
    fn test_unsorted_input_is_handled() {
        // Caller ordering is not trusted; ranks come from timestamps.
        let now = now();
        let versions = vec![
            version(1, 10, 30, now),
            version(3, 10, 1, now),
            version(2, 10, 20, now),
        ];
        let policy = RetentionPolicy {
            max_versions: 1,
            max_age_days: 7,
        };

        let selection = select_prunable(&versions, &policy, now);

        let gens: Vec<u64> = selection.candidates.iter().map(|v| v.generation).collect();
        assert_eq!(gens, vec![2, 1]);
    }
}
