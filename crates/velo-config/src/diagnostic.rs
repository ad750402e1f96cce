//! Diagnostics for build-description parsing
//!
//! All lexer and parser errors flow through the unified Diagnostic type so
//! the driver can report every problem in one pass instead of stopping at
//! the first bad token.

use std::fmt;

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal error that invalidates the build description
    Error,
    /// Warning that does not invalidate the build description
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Main diagnostic message
    pub message: String,
    /// File label the source text was parsed under
    pub file: String,
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(message: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Whether this diagnostic is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, self.severity, self.message
        )
    }
}

/// Whether any diagnostic in the slice is an error
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
