// src/watch/watcher.rs

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{DevloopError, Result};
use crate::watch::hash::{file_digest, Digest};
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::ExclusionRules;

/// Anything that can report which files changed since it was last asked.
///
/// Production code uses [`Watcher`]; tests can script the answers.
pub trait ChangeSource: Send + Sync + 'static {
    fn changes(&self) -> Result<Vec<String>>;
}

/// Construction parameters for a [`Watcher`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directory walked on every check. Reported paths are relative to it.
    pub root: PathBuf,
    pub exclusions: ExclusionRules,
}

/// Last known digest per relative path, plus the time of the last check that
/// found something.
///
/// Entries are never evicted: a deleted file keeps its stale digest and is
/// simply never walked again.
#[derive(Debug, Default)]
struct Baseline {
    digests: HashMap<String, Digest>,
    last_check: Option<SystemTime>,
}

/// Polling, content-hash based change detector.
///
/// Each call to [`Watcher::changes`] walks the whole tree. Files whose mtime
/// predates the last successful check are skipped without being read; the rest
/// are hashed and compared with the baseline.
#[derive(Debug)]
pub struct Watcher {
    root: PathBuf,
    exclusions: ExclusionRules,
    baseline: Mutex<Baseline>,
}

impl Watcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            root: config.root,
            exclusions: config.exclusions,
            baseline: Mutex::new(Baseline::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the relative paths that changed since the previous call.
    ///
    /// The first call only records the baseline timestamp and reports
    /// nothing. On error the whole cycle is discarded: no digest is updated
    /// and the timestamp stays put, so the next call re-examines everything.
    pub fn changes(&self) -> Result<Vec<String>> {
        let mut baseline = self.baseline.lock();
        let check_time = SystemTime::now();

        let Some(last_check) = baseline.last_check else {
            baseline.last_check = Some(check_time);
            info!(root = ?self.root, "watch baseline established");
            return Ok(Vec::new());
        };

        let staged = self.scan(&baseline.digests, last_check)?;

        let mut changes = Vec::with_capacity(staged.len());
        for (path, digest) in staged {
            baseline.digests.insert(path.clone(), digest);
            changes.push(path);
        }

        if !changes.is_empty() {
            baseline.last_check = Some(check_time);
        }

        Ok(changes)
    }

    /// Walk the tree and return `(path, new digest)` for every changed file,
    /// in walk order.
    fn scan(
        &self,
        known: &HashMap<String, Digest>,
        last_check: SystemTime,
    ) -> Result<Vec<(String, Digest)>> {
        let mut staged = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            let file_type = entry.file_type();
            if file_type.is_dir() || !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }

            let Some(rel) = relative_str(&self.root, entry.path()) else {
                continue;
            };

            if self.exclusions.is_excluded(&rel) {
                continue;
            }

            // Follows symlinks; a dangling link is not something we can watch.
            let metadata = match fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(e) if file_type.is_symlink() && e.kind() == ErrorKind::NotFound => {
                    debug!(path = %rel, "skipping dangling symlink");
                    continue;
                }
                Err(source) => return Err(watch_io(entry.path(), source)),
            };
            if metadata.is_dir() {
                continue;
            }

            let modified = metadata
                .modified()
                .map_err(|source| watch_io(entry.path(), source))?;
            if modified < last_check {
                continue;
            }

            let digest = file_digest(entry.path()).map_err(|source| watch_io(entry.path(), source))?;

            match known.get(&rel) {
                None => debug!(path = %rel, hash = %digest.to_hex(), "file added"),
                Some(previous) if *previous == digest => continue,
                Some(_) => debug!(path = %rel, hash = %digest.to_hex(), "file changed"),
            }

            staged.push((rel, digest));
        }

        Ok(staged)
    }
}

impl ChangeSource for Watcher {
    fn changes(&self) -> Result<Vec<String>> {
        Watcher::changes(self)
    }
}

fn watch_io(path: &Path, source: std::io::Error) -> DevloopError {
    DevloopError::WatchIo {
        path: path.to_path_buf(),
        source,
    }
}
