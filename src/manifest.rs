// Manifest snapshots and ancestor persistence
//
// A Manifest maps logical paths to content metadata for one side of the
// sync (local, remote, or the last-synced ancestor). The ancestor manifest
// is persisted in a text-based format under the state directory and is the
// only state that survives between runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Component, Path};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::hash::ContentHash;

/// Content metadata for one logical path on one side of the sync.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Logical path: relative, slash-normalized, unique within a manifest.
    pub path: String,
    /// Digest of the uncompressed content.
    pub hash: ContentHash,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Whether the remote copy is stored compressed.
    pub compressed: bool,
}

/// A snapshot mapping of logical paths to entries for one side.
///
/// Plain value object; built fresh on every invocation and passed between
/// components, never shared as global state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Format version written in the state file header.
    const FORMAT_VERSION: &'static str = "v1";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Sorted union of the paths in `self` and `other`.
    pub fn union_paths<'a>(&'a self, other: &'a Manifest) -> BTreeSet<&'a str> {
        self.entries
            .keys()
            .chain(other.entries.keys())
            .map(String::as_str)
            .collect()
    }

    /// Load a persisted manifest, returning an empty one if the file does
    /// not exist (first run).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::load_from_file(path)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut manifest = Manifest::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            // Skip comments and blank lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse: <hash> <size> <mtime_ns> <c|-> <path>
            let parts: Vec<&str> = line.splitn(5, ' ').collect();
            if parts.len() != 5 {
                continue; // Skip malformed lines
            }

            let hash = match ContentHash::from_hex(parts[0]) {
                Some(h) => h,
                None => continue,
            };
            let size: u64 = parts[1].parse().unwrap_or(0);
            let mtime_ns: i64 = parts[2].parse().unwrap_or(0);
            let compressed = parts[3] == "c";

            // Unquote path if needed
            let path_str = parts[4];
            let logical = if path_str.starts_with('"') && path_str.ends_with('"') {
                path_str[1..path_str.len() - 1].replace("\\\"", "\"")
            } else {
                path_str.to_string()
            };

            manifest.insert(ManifestEntry {
                path: logical,
                hash,
                size,
                modified: DateTime::from_timestamp_nanos(mtime_ns),
                compressed,
            });
        }

        Ok(manifest)
    }

    /// Persist to `path` (atomic write: temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_file = path.with_extension("tmp");

        {
            let mut file = fs::File::create(&temp_file)?;

            writeln!(file, "# bucketsync manifest {}", Self::FORMAT_VERSION)?;
            writeln!(file, "# saved: {}", Utc::now().to_rfc3339())?;

            // BTreeMap iteration is already sorted, keeping output deterministic
            for entry in self.entries.values() {
                Self::write_entry(&mut file, entry)?;
            }
        }

        fs::rename(&temp_file, path)?;

        Ok(())
    }

    fn write_entry(file: &mut fs::File, entry: &ManifestEntry) -> Result<()> {
        let mtime_ns = entry.modified.timestamp_nanos_opt().unwrap_or(0);
        let flag = if entry.compressed { "c" } else { "-" };

        let path_formatted = if entry.path.contains(' ') || entry.path.contains('"') {
            format!("\"{}\"", entry.path.replace('"', "\\\""))
        } else {
            entry.path.clone()
        };

        writeln!(
            file,
            "{} {} {} {} {}",
            entry.hash.to_hex(),
            entry.size,
            mtime_ns,
            flag,
            path_formatted
        )?;

        Ok(())
    }
}

/// Convert a relative filesystem path to the logical slash-normalized form
/// used as a manifest key.
pub fn logical_path(rel: &Path) -> String {
    let mut out = String::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}
