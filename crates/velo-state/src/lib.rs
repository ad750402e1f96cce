//! Incremental build state for the Velo build system
//!
//! Provides the persistence half of the build driver:
//! - Per-target [`ArtifactRecord`]s with content, command, and dependency hashes
//! - The [`StateManager`]: thread-safe dirty checking, record updates, and a
//!   modification-time-validated file-hash cache
//! - A versioned, self-describing state manifest with lenient per-record loading
//!
//! Dirty checks ask, in priority order: does the artifact exist, do we have a
//! record, is the target marked dirty by propagation, did the toolchain or
//! flags change, did any source, dependency artifact, or implicit input
//! change. The first matching reason is returned.

pub mod hash;
pub mod manager;
pub mod manifest;
pub mod record;

pub use manager::{file_timestamp, StateError, StateManager, StateResult, STATE_FILE_NAME};
pub use manifest::MANIFEST_VERSION;
pub use record::{ArtifactRecord, BuildStats, DependencyInfo, DirtyReason, ToolchainIdentity};
