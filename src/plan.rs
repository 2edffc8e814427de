//! Diff & sync planner.
//!
//! Produces a pure [`SyncPlan`] from three manifests: local, remote, and
//! the last-synced ancestor. The ancestor is what distinguishes "remote
//! changed because we pushed it" from "remote changed independently" — a
//! path where only one side moved since the last sync resolves to a plain
//! push or pull without ever reaching the conflict resolver.

use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Skip,
    Push,
    Pull,
    Conflict,
}

/// Why the planner chose an action; carried through to events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Local and remote content is identical.
    Unchanged,
    /// Path exists only locally.
    LocalOnly,
    /// Path exists only remotely.
    RemoteOnly,
    /// Local matches the ancestor; remote moved.
    RemoteChanged,
    /// Remote matches the ancestor; local moved.
    LocalChanged,
    /// Both sides diverged from the ancestor.
    BothChanged,
    /// Both sides differ and no ancestor record exists.
    NoAncestor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    pub path: String,
    pub kind: ActionKind,
    pub reason: Reason,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// One action per path, ordered by path.
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// True when nothing needs to transfer or be resolved.
    pub fn is_noop(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.kind == ActionKind::Skip)
    }
}

/// Three-way diff over the union of local and remote paths.
///
/// The check order below is a tie-break rule, not an optimization:
/// content equality wins over everything, one-sided presence wins over
/// ancestor comparison, and only a genuine two-sided divergence (or a
/// missing ancestor record) becomes a conflict.
pub fn plan(local: &Manifest, remote: &Manifest, ancestor: &Manifest) -> SyncPlan {
    let mut actions = Vec::new();

    for path in local.union_paths(remote) {
        let (kind, reason) = match (local.get(path), remote.get(path)) {
            (Some(l), Some(r)) if l.hash == r.hash => (ActionKind::Skip, Reason::Unchanged),
            (Some(_), None) => (ActionKind::Push, Reason::LocalOnly),
            (None, Some(_)) => (ActionKind::Pull, Reason::RemoteOnly),
            (Some(l), Some(r)) => match ancestor.get(path) {
                Some(a) if l.hash == a.hash && r.hash != a.hash => {
                    (ActionKind::Pull, Reason::RemoteChanged)
                }
                Some(a) if r.hash == a.hash && l.hash != a.hash => {
                    (ActionKind::Push, Reason::LocalChanged)
                }
                Some(_) => (ActionKind::Conflict, Reason::BothChanged),
                None => (ActionKind::Conflict, Reason::NoAncestor),
            },
            (None, None) => continue,
        };

        actions.push(SyncAction {
            path: path.to_string(),
            kind,
            reason,
        });
    }

    SyncPlan { actions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::manifest::ManifestEntry;
    use chrono::DateTime;

    fn entry(path: &str, content: &[u8], mtime_secs: i64) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            hash: ContentHash::from_bytes(content),
            size: content.len() as u64,
            modified: DateTime::from_timestamp(mtime_secs, 0).unwrap(),
            compressed: false,
        }
    }

    fn manifest(entries: Vec<ManifestEntry>) -> Manifest {
        let mut m = Manifest::new();
        for e in entries {
            m.insert(e);
        }
        m
    }

    fn action_for<'a>(plan: &'a SyncPlan, path: &str) -> &'a SyncAction {
        plan.actions
            .iter()
            .find(|a| a.path == path)
            .unwrap_or_else(|| panic!("no action for {path}"))
    }

    #[test]
    fn test_identical_content_skips_despite_mtime() {
        // Dedup rule: equal hashes always skip, mtimes are irrelevant.
        let local = manifest(vec![entry("a.json", b"same", 2000)]);
        let remote = manifest(vec![entry("a.json", b"same", 1000)]);
        let ancestor = manifest(vec![entry("a.json", b"same", 1000)]);

        let p = plan(&local, &remote, &ancestor);

        assert_eq!(p.actions.len(), 1);
        let a = action_for(&p, "a.json");
        assert_eq!(a.kind, ActionKind::Skip);
        assert_eq!(a.reason, Reason::Unchanged);
        assert!(p.is_noop());
    }

    #[test]
    fn test_local_only_pushes() {
        let local = manifest(vec![entry("new.txt", b"fresh", 1000)]);
        let p = plan(&local, &Manifest::new(), &Manifest::new());

        let a = action_for(&p, "new.txt");
        assert_eq!(a.kind, ActionKind::Push);
        assert_eq!(a.reason, Reason::LocalOnly);
    }

    #[test]
    fn test_remote_only_pulls() {
        let remote = manifest(vec![entry("cloud.txt", b"remote", 1000)]);
        let p = plan(&Manifest::new(), &remote, &Manifest::new());

        let a = action_for(&p, "cloud.txt");
        assert_eq!(a.kind, ActionKind::Pull);
        assert_eq!(a.reason, Reason::RemoteOnly);
    }

    #[test]
    fn test_only_remote_changed_pulls() {
        let local = manifest(vec![entry("a.json", b"v1", 1000)]);
        let remote = manifest(vec![entry("a.json", b"v2", 2000)]);
        let ancestor = manifest(vec![entry("a.json", b"v1", 1000)]);

        let p = plan(&local, &remote, &ancestor);

        let a = action_for(&p, "a.json");
        assert_eq!(a.kind, ActionKind::Pull);
        assert_eq!(a.reason, Reason::RemoteChanged);
    }

    #[test]
    fn test_only_local_changed_pushes() {
        let local = manifest(vec![entry("a.json", b"v2", 2000)]);
        let remote = manifest(vec![entry("a.json", b"v1", 1000)]);
        let ancestor = manifest(vec![entry("a.json", b"v1", 1000)]);

        let p = plan(&local, &remote, &ancestor);

        let a = action_for(&p, "a.json");
        assert_eq!(a.kind, ActionKind::Push);
        assert_eq!(a.reason, Reason::LocalChanged);
    }

    #[test]
    fn test_both_changed_conflicts() {
        let local = manifest(vec![entry("a.json", b"local-edit", 2000)]);
        let remote = manifest(vec![entry("a.json", b"remote-edit", 2100)]);
        let ancestor = manifest(vec![entry("a.json", b"base", 1000)]);

        let p = plan(&local, &remote, &ancestor);

        let a = action_for(&p, "a.json");
        assert_eq!(a.kind, ActionKind::Conflict);
        assert_eq!(a.reason, Reason::BothChanged);
    }

    #[test]
    fn test_no_ancestor_record_conflicts() {
        let local = manifest(vec![entry("a.json", b"mine", 2000)]);
        let remote = manifest(vec![entry("a.json", b"theirs", 2100)]);

        let p = plan(&local, &remote, &Manifest::new());

        let a = action_for(&p, "a.json");
        assert_eq!(a.kind, ActionKind::Conflict);
        assert_eq!(a.reason, Reason::NoAncestor);
    }

    #[test]
    fn test_plan_is_deterministic_and_sorted() {
        let local = manifest(vec![
            entry("b.txt", b"b", 0),
            entry("a.txt", b"a", 0),
            entry("c.txt", b"c", 0),
        ]);
        let remote = manifest(vec![entry("d.txt", b"d", 0)]);

        let p1 = plan(&local, &remote, &Manifest::new());
        let p2 = plan(&local, &remote, &Manifest::new());

        assert_eq!(p1.actions, p2.actions);
        let paths: Vec<&str> = p1.actions.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt", "d.txt"]);
    }

    #[test]
    fn test_mixed_plan_counts() {
        let local = manifest(vec![
            entry("same.txt", b"x", 0),
            entry("local-new.txt", b"l", 0),
            entry("edited.txt", b"local", 0),
        ]);
        let remote = manifest(vec![
            entry("same.txt", b"x", 0),
            entry("remote-new.txt", b"r", 0),
            entry("edited.txt", b"remote", 0),
        ]);
        let ancestor = manifest(vec![
            entry("same.txt", b"x", 0),
            entry("edited.txt", b"base", 0),
        ]);

        let p = plan(&local, &remote, &ancestor);

        assert_eq!(p.count(ActionKind::Skip), 1);
        assert_eq!(p.count(ActionKind::Push), 1);
        assert_eq!(p.count(ActionKind::Pull), 1);
        assert_eq!(p.count(ActionKind::Conflict), 1);
    }
}
