//! Import scanning
//!
//! The preferred scanner asks the compiler itself for a structured import
//! list (`veloc --emit-deps`), so the build graph sees exactly what the
//! compiler will resolve. When the compiler is unavailable the textual
//! fallback extracts `use <identifier>` statements with a regex; it can be
//! fooled by string literals but is good enough for planning.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::debug;

use crate::adapters::ImportScanner;

/// Regex-based `use` statement scanner (fallback path)
#[derive(Debug)]
pub struct TextImportScanner {
    pattern: Regex,
}

impl TextImportScanner {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?m)^\s*use\s+([A-Za-z_][A-Za-z0-9_]*)")
                .expect("use-statement regex is valid"),
        }
    }
}

impl Default for TextImportScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportScanner for TextImportScanner {
    fn scan(&self, source: &Path) -> io::Result<Vec<String>> {
        let text = std::fs::read_to_string(source)?;
        let mut imports = Vec::new();
        for capture in self.pattern.captures_iter(&text) {
            let name = capture[1].to_string();
            if !imports.contains(&name) {
                imports.push(name);
            }
        }
        Ok(imports)
    }
}

/// Compiler-backed scanner with textual fallback
///
/// Runs `<compiler> --emit-deps <source>` and reads one module name per
/// stdout line. Any spawn failure or non-zero exit falls back to the
/// textual scan, so builds still plan without a working compiler.
#[derive(Debug)]
pub struct CompilerImportScanner {
    compiler: PathBuf,
    fallback: TextImportScanner,
}

impl CompilerImportScanner {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            fallback: TextImportScanner::new(),
        }
    }
}

impl ImportScanner for CompilerImportScanner {
    fn scan(&self, source: &Path) -> io::Result<Vec<String>> {
        let output = Command::new(&self.compiler)
            .arg("--emit-deps")
            .arg(source)
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok(stdout
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect())
            }
            Ok(output) => {
                debug!(
                    source = %source.display(),
                    code = output.status.code().unwrap_or(-1),
                    "compiler --emit-deps failed, using textual scan"
                );
                self.fallback.scan(source)
            }
            Err(error) => {
                debug!(
                    compiler = %self.compiler.display(),
                    %error,
                    "compiler unavailable, using textual scan"
                );
                self.fallback.scan(source)
            }
        }
    }
}
