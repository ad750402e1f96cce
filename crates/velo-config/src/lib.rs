//! Velo build-description parsing and resolution
//!
//! Provides the front half of the build driver:
//! - Lexer and recursive-descent parser for the braced build-description
//!   grammar, with arena-backed AST and panic-mode error recovery
//! - Legacy flat-dialect front-end for older configuration files
//! - `&{VAR}` interpolation with hierarchical scopes and cycle detection
//! - Extraction into the immutable [`ConfigModel`] consumed by the driver
//!
//! # Example
//!
//! ```
//! let source = r#"{
//!     project: { name: `demo` },
//!     variables: { SRC: `src` },
//!     targets: [ { name: `app`, sources: [`&{SRC}/main.velo`] } ],
//! }"#;
//!
//! let model = velo_config::load_model(source, "build.vbc").unwrap();
//! assert_eq!(model.project_name(), Some("demo"));
//! assert_eq!(model.targets[0].source_patterns, vec!["src/main.velo"]);
//! ```

pub mod ast;
pub mod diagnostic;
pub mod interp;
pub mod legacy;
pub mod lexer;
pub mod model;
pub mod parser;

use thiserror::Error;

use diagnostic::Diagnostic;
use interp::InterpError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("syntax errors in {file}")]
    Syntax {
        file: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error(transparent)]
    Interpolation(#[from] InterpError),

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("duplicate target name '{0}'")]
    DuplicateTarget(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use ast::{Arena, Node, NodeId, Segment, StringValue};
pub use diagnostic::{has_errors, Severity};
pub use interp::{Interpolator, Scope};
pub use model::{extract_model, ConfigModel, TargetKind, TargetSpec};
pub use parser::{parse_document, Document};

/// Parse build-description text (either dialect) and resolve it into a
/// [`ConfigModel`]. Collects every syntax diagnostic before failing.
pub fn load_model(source: &str, file: &str) -> ConfigResult<ConfigModel> {
    let (document, diagnostics) = if legacy::looks_like_legacy(source) {
        legacy::parse_legacy(source, file)
    } else {
        parser::parse_document(source, file)
    };

    if diagnostic::has_errors(&diagnostics) {
        return Err(ConfigError::Syntax {
            file: file.to_string(),
            diagnostics,
        });
    }

    model::extract_model(&document, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_model_braced_dialect() {
        let model = load_model("{ targets: [ { name: `app` } ] }", "build.vbc").unwrap();
        assert_eq!(model.targets.len(), 1);
    }

    #[test]
    fn test_load_model_legacy_dialect() {
        let model = load_model("[target.app]\nsources = [\"main.velo\"]\n", "build.vbc").unwrap();
        assert_eq!(model.targets[0].name, "app");
    }

    #[test]
    fn test_load_model_collects_all_syntax_errors() {
        let err = load_model("{ a: @, b: # }", "build.vbc").unwrap_err();
        match err {
            ConfigError::Syntax { diagnostics, .. } => assert!(diagnostics.len() >= 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
