//! Data structures for build state tracking

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A dependency with its content hash at build time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub path: PathBuf,
    /// Content hash at the time of the build, with algorithm prefix
    pub hash: String,
}

impl DependencyInfo {
    pub fn new(path: impl Into<PathBuf>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
        }
    }
}

/// Persisted state of one built artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub target_name: String,
    pub output_path: PathBuf,

    /// Combined content hash of all sources, with algorithm prefix
    pub source_hash: String,
    /// FNV-1a hash of the ordered flag list (global flags included)
    pub command_hash: u64,

    /// Dependency artifacts with the hashes observed at build time
    #[serde(default)]
    pub direct_dependencies: Vec<DependencyInfo>,
    /// Paths the build implicitly consumed (embedded resources and the like)
    #[serde(default)]
    pub implicit_dependencies: Vec<PathBuf>,

    /// Last modification of the first source, seconds since the epoch
    #[serde(default)]
    pub source_timestamp: u64,
    /// When the artifact was built, seconds since the epoch
    #[serde(default)]
    pub build_timestamp: u64,

    #[serde(default)]
    pub build_duration_ms: u64,
}

impl ArtifactRecord {
    /// A record is usable only when it names a target and carries a source hash
    pub fn is_valid(&self) -> bool {
        !self.target_name.is_empty() && !self.source_hash.is_empty()
    }
}

/// Identity of the compiler the state was recorded against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainIdentity {
    pub compiler_version: String,
    /// Content hash of the compiler binary, empty when unavailable
    #[serde(default)]
    pub compiler_hash: String,
}

impl ToolchainIdentity {
    pub fn new(version: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            compiler_version: version.into(),
            compiler_hash: hash.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.compiler_version.is_empty()
    }
}

/// Why a target needs rebuilding; the first matching reason wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyReason {
    /// Up to date, nothing to do
    Clean,
    /// Output artifact does not exist
    MissingArtifact,
    /// No previous build record
    MissingRecord,
    /// A dependency is being rebuilt
    DependencyDirty,
    /// Compiler identity changed since the record was written
    ToolchainChanged,
    /// Compilation flags changed
    FlagsChanged,
    /// Combined source hash mismatch
    SourceChanged,
    /// A dependency artifact's content hash changed
    DependencyChanged,
    /// An implicit input is missing or newer than the build
    ImplicitDepChanged,
}

impl DirtyReason {
    pub fn is_clean(self) -> bool {
        self == DirtyReason::Clean
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DirtyReason::Clean => "clean",
            DirtyReason::MissingArtifact => "missing_artifact",
            DirtyReason::MissingRecord => "missing_record",
            DirtyReason::DependencyDirty => "dependency_dirty",
            DirtyReason::ToolchainChanged => "toolchain_changed",
            DirtyReason::FlagsChanged => "flags_changed",
            DirtyReason::SourceChanged => "source_changed",
            DirtyReason::DependencyChanged => "dependency_changed",
            DirtyReason::ImplicitDepChanged => "implicit_dep_changed",
        }
    }
}

impl fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate counters for one build session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub total_targets: usize,
    pub rebuilt_targets: usize,
    pub cached_targets: usize,
    pub failed_targets: usize,
}

impl BuildStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_targets == 0 {
            return 0.0;
        }
        self.cached_targets as f64 / self.total_targets as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_validity() {
        let mut record = ArtifactRecord::default();
        assert!(!record.is_valid());

        record.target_name = "app".to_string();
        assert!(!record.is_valid());

        record.source_hash = "sha256:abc".to_string();
        assert!(record.is_valid());
    }

    #[test]
    fn test_toolchain_equality() {
        let a = ToolchainIdentity::new("0.4.0", "sha256:aa");
        let b = ToolchainIdentity::new("0.4.0", "sha256:aa");
        let c = ToolchainIdentity::new("0.4.1", "sha256:aa");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(ToolchainIdentity::default().is_empty());
        assert!(!a.is_empty());
    }

    #[test]
    fn test_dirty_reason_strings() {
        assert_eq!(DirtyReason::Clean.as_str(), "clean");
        assert_eq!(DirtyReason::SourceChanged.to_string(), "source_changed");
        assert!(DirtyReason::Clean.is_clean());
        assert!(!DirtyReason::FlagsChanged.is_clean());
    }

    #[test]
    fn test_cache_hit_rate() {
        let stats = BuildStats {
            total_targets: 4,
            rebuilt_targets: 1,
            cached_targets: 3,
            failed_targets: 0,
        };
        assert!((stats.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(BuildStats::default().cache_hit_rate(), 0.0);
    }
}
