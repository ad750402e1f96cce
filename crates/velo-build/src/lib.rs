//! Incremental, parallel build driver for Velo projects
//!
//! Consumes a declarative build description, determines which targets are
//! stale against the persisted state manifest, and executes the required
//! compilations in dependency order with bounded concurrency:
//! - Dependency graph with deterministic topological ordering and cycle
//!   detection
//! - Message-passing scheduler with at-most-once dispatch, fail-fast and
//!   keep-going failure policies, and cooperative cancellation
//! - Pipeline orchestration from parse through state save
//! - Adapter traits (and default implementations) for source expansion,
//!   import scanning, and compiler execution

pub mod adapters;
pub mod compiler;
pub mod error;
pub mod glob;
pub mod graph;
pub mod orchestrator;
pub mod progress;
pub mod scan;
pub mod scheduler;

// Re-export main types
pub use velo_config::ConfigError;
pub use adapters::{
    CompileOutput, CompilerExecutor, ExpandError, GlobOptions, ImportScanner, SourceExpander,
};
pub use compiler::{ProcessCompiler, DEFAULT_COMPILER};
pub use error::{BuildError, BuildResult};
pub use glob::WalkdirExpander;
pub use graph::DependencyGraph;
pub use orchestrator::{BuildOptions, BuildReport, Orchestrator};
pub use progress::{BuildPhase, NullObserver, ProgressObserver};
pub use scan::{CompilerImportScanner, TextImportScanner};
pub use scheduler::{
    FailurePolicy, ScheduleOutcome, Scheduler, TargetBuilder, TargetOutcome, TargetStatus,
};
