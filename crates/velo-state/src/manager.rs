//! Incremental state manager
//!
//! Tracks per-target build records, answers dirty checks, and persists the
//! state manifest. Dirty checks vastly outnumber record updates, so records
//! live under a reader/writer lock; the file-hash cache has its own lock so
//! hashing one target's sources never blocks another's dirty check. No lock
//! is held while a compiler process runs or while file content is hashed
//! against the records.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::hash;
use crate::manifest;
use crate::record::{ArtifactRecord, BuildStats, DependencyInfo, DirtyReason, ToolchainIdentity};

/// Default manifest file name under the state directory
pub const STATE_FILE_NAME: &str = ".velo_build_state";

/// State persistence errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },

    #[error("malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, ArtifactRecord>,
    dirty: BTreeSet<String>,
    toolchain: ToolchainIdentity,
    saved_toolchain: ToolchainIdentity,
    stats: BuildStats,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    digest: String,
    mtime: u64,
}

/// Thread-safe incremental build state
#[derive(Debug)]
pub struct StateManager {
    state_path: PathBuf,
    inner: RwLock<Inner>,
    hash_cache: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl StateManager {
    /// Create a manager persisting to the default file under `state_dir`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self::at_path(state_dir.as_ref().join(STATE_FILE_NAME))
    }

    /// Create a manager persisting to an explicit manifest path
    pub fn at_path(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            inner: RwLock::new(Inner::default()),
            hash_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Load the manifest. An absent file is success with empty state;
    /// only an unreadable or structurally malformed file is an error.
    pub fn load(&self) -> StateResult<()> {
        if !self.state_path.exists() {
            self.inner.write().unwrap().records.clear();
            return Ok(());
        }

        let text = fs::read_to_string(&self.state_path).map_err(|source| StateError::Read {
            path: self.state_path.clone(),
            source,
        })?;

        let (toolchain, records) =
            manifest::deserialize(&text).map_err(|source| StateError::Parse {
                path: self.state_path.clone(),
                source,
            })?;

        debug!(records = records.len(), "loaded build state");
        let mut inner = self.inner.write().unwrap();
        inner.records = records;
        inner.saved_toolchain = toolchain;
        Ok(())
    }

    /// Write the manifest atomically: serialize to a sibling temp file,
    /// then rename over the destination.
    pub fn save(&self) -> StateResult<()> {
        if let Some(parent) = self.state_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| StateError::Write {
                    path: self.state_path.clone(),
                    source,
                })?;
            }
        }

        let text = {
            let inner = self.inner.read().unwrap();
            manifest::serialize(&inner.toolchain, &inner.records)
        };

        let tmp_path = self.state_path.with_extension("tmp");
        fs::write(&tmp_path, text).map_err(|source| StateError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.state_path).map_err(|source| StateError::Write {
            path: self.state_path.clone(),
            source,
        })
    }

    /// Drop all records, dirty marks, caches, and statistics
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.records.clear();
        inner.dirty.clear();
        inner.stats = BuildStats::default();
        drop(inner);
        self.hash_cache.write().unwrap().clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Determine whether a target needs rebuilding. Rules are ordered;
    /// the first match wins.
    pub fn check_dirty(
        &self,
        target_name: &str,
        output_path: &Path,
        sources: &[PathBuf],
        flags: &[String],
    ) -> DirtyReason {
        // Rule 1: the output artifact must exist
        if !output_path.exists() {
            return DirtyReason::MissingArtifact;
        }

        // Rules 2-5 only touch in-memory state; hold the lock briefly and
        // clone what the content rules need.
        let record = {
            let inner = self.inner.read().unwrap();

            let Some(record) = inner.records.get(target_name) else {
                return DirtyReason::MissingRecord;
            };

            if inner.dirty.contains(target_name) {
                return DirtyReason::DependencyDirty;
            }

            if inner.toolchain != inner.saved_toolchain {
                return DirtyReason::ToolchainChanged;
            }

            if hash::hash_flags(flags) != record.command_hash {
                return DirtyReason::FlagsChanged;
            }

            record.clone()
        };

        // Rule 6: combined source hash must match
        match self.hash_files(sources) {
            Ok(current) if current == record.source_hash => {}
            _ => return DirtyReason::SourceChanged,
        }

        // Rule 7: direct dependency artifacts must match their recorded hashes
        for dep in &record.direct_dependencies {
            if self.file_content_changed(&dep.path, &dep.hash) {
                return DirtyReason::DependencyChanged;
            }
        }

        // Rule 8: implicit inputs must exist and predate the build
        for implicit in &record.implicit_dependencies {
            if !implicit.exists() || file_timestamp(implicit) > record.build_timestamp {
                return DirtyReason::ImplicitDepChanged;
            }
        }

        DirtyReason::Clean
    }

    pub fn get_record(&self, target_name: &str) -> Option<ArtifactRecord> {
        self.inner.read().unwrap().records.get(target_name).cloned()
    }

    pub fn has_state(&self) -> bool {
        !self.inner.read().unwrap().records.is_empty()
    }

    pub fn target_count(&self) -> usize {
        self.inner.read().unwrap().records.len()
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Record a successful build, replacing any previous record and
    /// clearing the target's dirty mark.
    #[allow(clippy::too_many_arguments)]
    pub fn update_record(
        &self,
        target_name: &str,
        output_path: &Path,
        sources: &[PathBuf],
        resolved_deps: Vec<DependencyInfo>,
        implicit_deps: Vec<PathBuf>,
        flags: &[String],
        build_duration_ms: u64,
    ) {
        // hash outside the record lock
        let source_hash = match self.hash_files(sources) {
            Ok(hash) => hash,
            Err(error) => {
                warn!(target = target_name, %error, "could not hash sources; record will force a rebuild");
                String::new()
            }
        };
        let source_timestamp = sources.first().map(|p| file_timestamp(p)).unwrap_or(0);

        let record = ArtifactRecord {
            target_name: target_name.to_string(),
            output_path: output_path.to_path_buf(),
            source_hash,
            command_hash: hash::hash_flags(flags),
            direct_dependencies: resolved_deps,
            implicit_dependencies: implicit_deps,
            source_timestamp,
            build_timestamp: now_epoch_seconds(),
            build_duration_ms,
        };

        let mut inner = self.inner.write().unwrap();
        inner.records.insert(target_name.to_string(), record);
        inner.dirty.remove(target_name);
        inner.stats.rebuilt_targets += 1;
        inner.stats.total_targets = inner.records.len();
    }

    /// Forget a target's record and mark it dirty
    pub fn invalidate(&self, target_name: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.records.remove(target_name);
        inner.dirty.insert(target_name.to_string());
    }

    /// Mark a target dirty (dirty-propagation input)
    pub fn mark_dirty(&self, target_name: &str) {
        self.inner
            .write()
            .unwrap()
            .dirty
            .insert(target_name.to_string());
    }

    pub fn is_marked_dirty(&self, target_name: &str) -> bool {
        self.inner.read().unwrap().dirty.contains(target_name)
    }

    // ------------------------------------------------------------------
    // Toolchain bookkeeping
    // ------------------------------------------------------------------

    /// Set the active toolchain. On a fresh project (nothing loaded) the
    /// saved identity is initialized too, so the first build is not
    /// misreported as a toolchain change.
    pub fn set_toolchain(&self, toolchain: ToolchainIdentity) {
        let mut inner = self.inner.write().unwrap();
        if inner.saved_toolchain.is_empty() {
            inner.saved_toolchain = toolchain.clone();
        }
        inner.toolchain = toolchain;
    }

    pub fn get_toolchain(&self) -> ToolchainIdentity {
        self.inner.read().unwrap().toolchain.clone()
    }

    pub fn toolchain_changed(&self) -> bool {
        let inner = self.inner.read().unwrap();
        inner.toolchain != inner.saved_toolchain
    }

    // ------------------------------------------------------------------
    // Hashing
    // ------------------------------------------------------------------

    /// Content hash of one file, served from the cache while the file's
    /// modification time is unchanged
    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let current_mtime = file_timestamp(path);

        {
            let cache = self.hash_cache.read().unwrap();
            if let Some(entry) = cache.get(path) {
                if entry.mtime == current_mtime {
                    return Ok(entry.digest.clone());
                }
            }
        }

        let digest = hash::digest_file(path)?;
        self.hash_cache.write().unwrap().insert(
            path.to_path_buf(),
            CacheEntry {
                digest: digest.clone(),
                mtime: current_mtime,
            },
        );
        Ok(digest)
    }

    /// Combined content hash of files in the given order
    pub fn hash_files(&self, paths: &[PathBuf]) -> io::Result<String> {
        let mut digests = Vec::with_capacity(paths.len());
        for path in paths {
            digests.push(self.hash_file(path)?);
        }
        Ok(hash::combine_digests(&digests))
    }

    /// 64-bit hash of an ordered flag list
    pub fn hash_flags(&self, flags: &[String]) -> u64 {
        hash::hash_flags(flags)
    }

    /// Drop one path from the hash cache (known external modification)
    pub fn invalidate_hash_cache(&self, path: &Path) {
        self.hash_cache.write().unwrap().remove(path);
    }

    pub fn clear_hash_cache(&self) {
        self.hash_cache.write().unwrap().clear();
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn get_stats(&self) -> BuildStats {
        self.inner.read().unwrap().stats
    }

    pub fn reset_stats(&self) {
        self.inner.write().unwrap().stats = BuildStats::default();
    }

    fn file_content_changed(&self, path: &Path, expected_hash: &str) -> bool {
        match self.hash_file(path) {
            Ok(current) => current != expected_hash,
            Err(_) => true,
        }
    }
}

/// Last modification time in seconds since the epoch, 0 when unavailable
pub fn file_timestamp(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
