//! Local tree scanner.
//!
//! Walks the local root, applies include/exclude filters, and hashes every
//! accepted file into a [`Manifest`]. Exclude filters are applied before
//! descending into directories, so an excluded subtree (dependency caches,
//! build output) is never traversed at all.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::hash::ContentHash;
use crate::manifest::{logical_path, Manifest, ManifestEntry};

pub struct Scanner {
    root: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    state_dir: String,
}

impl Scanner {
    pub fn new(root: &Path, state_dir: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            include: Vec::new(),
            exclude: Vec::new(),
            state_dir: state_dir.to_string(),
        }
    }

    /// Restrict the scan to files matching at least one pattern.
    pub fn include(mut self, patterns: &[String]) -> Result<Self> {
        for p in patterns {
            self.include.push(Pattern::new(p)?);
        }
        Ok(self)
    }

    /// Exclude files and whole directories matching any pattern.
    pub fn exclude(mut self, patterns: &[String]) -> Result<Self> {
        for p in patterns {
            self.exclude.push(Pattern::new(p)?);
        }
        Ok(self)
    }

    /// Walk the tree and hash every accepted file.
    ///
    /// Blocking; the engine runs this inside `spawn_blocking`. Files that
    /// disappear between listing and hashing (a race with concurrent
    /// writers) are skipped, not treated as scan failures.
    pub fn scan(&self) -> Result<Manifest> {
        if !self.root.is_dir() {
            return Err(SyncError::Config(format!(
                "local root does not exist: {}",
                self.root.display()
            )));
        }

        let candidates = self.collect_candidates()?;

        // Hashing dominates scan time; spread it across the rayon pool.
        let entries: Vec<ManifestEntry> = candidates
            .into_par_iter()
            .filter_map(|(abs, logical)| match Self::read_entry(&abs, logical) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %abs.display(), error = %e, "skipping unreadable file");
                    None
                }
            })
            .collect();

        let mut manifest = Manifest::new();
        for entry in entries {
            manifest.insert(entry);
        }
        Ok(manifest)
    }

    fn collect_candidates(&self) -> Result<Vec<(PathBuf, String)>> {
        let root = self.root.clone();
        let exclude = self.exclude.clone();
        let state_dir = self.state_dir.clone();

        let mut walker = WalkBuilder::new(&self.root);
        walker
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false);

        // Pruning here keeps excluded directories from ever being read.
        walker.filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == state_dir {
                return false;
            }
            let rel = match entry.path().strip_prefix(&root) {
                Ok(rel) => logical_path(rel),
                Err(_) => return true,
            };
            !matches_any(&exclude, &rel, &name)
        });

        let mut candidates = Vec::new();
        for result in walker.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    // Races with concurrent deleters surface here.
                    debug!(error = %e, "walk entry skipped");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            let logical = logical_path(&rel);
            let name = entry.file_name().to_string_lossy().to_string();

            if !self.include.is_empty() && !matches_any(&self.include, &logical, &name) {
                continue;
            }

            candidates.push((entry.path().to_path_buf(), logical));
        }
        Ok(candidates)
    }

    /// Stat and hash one file. Returns Ok(None) when the file vanished
    /// between the walk and the read.
    fn read_entry(abs: &Path, logical: String) -> Result<Option<ManifestEntry>> {
        let metadata = match fs::metadata(abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %abs.display(), "file vanished during scan");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file = match fs::File::open(abs) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %abs.display(), "file vanished during scan");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let hash = ContentHash::from_reader(file)?;

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(ManifestEntry {
            path: logical,
            hash,
            size: metadata.len(),
            modified,
            compressed: false,
        }))
    }
}

fn matches_any(patterns: &[Pattern], rel: &str, name: &str) -> bool {
    patterns.iter().any(|p| p.matches(rel) || p.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner(root: &Path) -> Scanner {
        Scanner::new(root, ".bucketsync")
    }

    #[test]
    fn test_scan_nested_tree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/deeper/b.txt"), b"content").unwrap();

        let manifest = scanner(dir.path()).scan().unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("a.json"));
        assert!(manifest.contains("sub/deeper/b.txt"));
        let b = manifest.get("sub/deeper/b.txt").unwrap();
        assert_eq!(b.hash, ContentHash::from_bytes(b"content"));
        assert_eq!(b.size, 7);
        assert!(!b.compressed);
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let err = scanner(Path::new("/definitely/not/a/dir")).scan().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_excluded_directory_contents_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), b"x").unwrap();

        let manifest = scanner(dir.path())
            .exclude(&["node_modules".to_string()])
            .unwrap()
            .scan()
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("keep.txt"));
    }

    #[test]
    fn test_exclude_file_pattern() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.json"), b"{}").unwrap();
        fs::write(dir.path().join("noise.log"), b"log").unwrap();

        let manifest = scanner(dir.path())
            .exclude(&["*.log".to_string()])
            .unwrap()
            .scan()
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("keep.json"));
    }

    #[test]
    fn test_include_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        fs::write(dir.path().join("b.txt"), b"txt").unwrap();

        let manifest = scanner(dir.path())
            .include(&["*.json".to_string()])
            .unwrap()
            .scan()
            .unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("a.json"));
    }

    #[test]
    fn test_state_dir_always_excluded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir_all(dir.path().join(".bucketsync")).unwrap();
        fs::write(dir.path().join(".bucketsync/last-sync.list"), b"state").unwrap();

        let manifest = scanner(dir.path()).scan().unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains("a.txt"));
    }

    #[test]
    fn test_bad_pattern_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(scanner(dir.path()).exclude(&["[".to_string()]).is_err());
    }
}
