//! Build driver error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use velo_config::ConfigError;

pub type BuildResult<T> = Result<T, BuildError>;

/// Fatal planning errors. Per-target build failures and cancellation are
/// not errors; they are reported through the build report.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build description not found: {0}")]
    BuildFileNotFound(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to expand pattern '{pattern}': {message}")]
    Expansion { pattern: String, message: String },

    #[error("no targets defined in build description")]
    NoTargets,

    #[error("target '{target}' matched no source files")]
    NoSources { target: String },

    #[error("unknown dependency '{dependency}' (required by '{target}')")]
    MissingDependency { target: String, dependency: String },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },
}

impl BuildError {
    /// Attach path context to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn expansion(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::Expansion {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Exit code at the host boundary: configuration and planning problems
    /// are usage errors (2); environment failures are build failures (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Io { .. } => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = BuildError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BuildError::NoTargets.exit_code(), 2);
        assert_eq!(BuildError::Cycle { path: vec![] }.exit_code(), 2);
        assert_eq!(
            BuildError::io("/x", io::Error::new(io::ErrorKind::Other, "boom")).exit_code(),
            1
        );
    }
}
