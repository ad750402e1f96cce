//! Adapter interfaces between the driver core and the outside world
//!
//! The core consumes these traits only; `glob`, `scan`, and `compiler`
//! provide the default implementations. Hosts can substitute their own
//! (tests inject in-memory fakes).

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use velo_state::ToolchainIdentity;

/// Options observed during source pattern expansion
#[derive(Debug, Clone)]
pub struct GlobOptions {
    /// Only report regular files
    pub files_only: bool,
    pub follow_symlinks: bool,
    /// Maximum directory depth below the base
    pub max_depth: usize,
    /// Match dotfiles and descend into dot-directories
    pub include_hidden: bool,
    pub case_sensitive: bool,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self {
            files_only: true,
            follow_symlinks: false,
            max_depth: 64,
            include_hidden: false,
            case_sensitive: true,
        }
    }
}

/// Pattern expansion failure
#[derive(Debug, Error)]
#[error("pattern '{pattern}': {message}")]
pub struct ExpandError {
    pub pattern: String,
    pub message: String,
}

impl ExpandError {
    pub fn new(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

/// Expands source patterns to concrete file paths
pub trait SourceExpander: Send + Sync {
    /// Expand one pattern relative to `base_dir`. Results are canonically
    /// sorted. A non-glob pattern resolves to the single named file when it
    /// exists, and to nothing when it does not.
    fn expand(
        &self,
        base_dir: &Path,
        pattern: &str,
        options: &GlobOptions,
    ) -> Result<Vec<PathBuf>, ExpandError>;
}

/// Extracts imported module names from a source file
pub trait ImportScanner: Send + Sync {
    fn scan(&self, source: &Path) -> io::Result<Vec<String>>;
}

/// Outcome of one compiler or archiver invocation
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CompileOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the underlying compiler and archiver
pub trait CompilerExecutor: Send + Sync {
    /// Compile sources into `output` with the given flags.
    /// A non-zero exit code is a build failure, not an `Err`; `Err` is
    /// reserved for failing to run the process at all.
    fn compile(
        &self,
        sources: &[PathBuf],
        output: &Path,
        flags: &[String],
    ) -> io::Result<CompileOutput>;

    /// Archive object files into a static library
    fn archive(&self, objects: &[PathBuf], output: &Path) -> io::Result<CompileOutput>;

    /// Identity of the toolchain, used for cache keying
    fn identity(&self) -> ToolchainIdentity;
}
