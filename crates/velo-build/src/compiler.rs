//! Process-spawning compiler executor
//!
//! Invokes `veloc` for compilation and `ar` for archiving static
//! libraries, capturing stdout/stderr and timing each invocation. Also
//! probes the toolchain identity (version string plus a content hash of
//! the compiler binary) used for cache keying.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::debug;
use velo_state::{hash, ToolchainIdentity};

use crate::adapters::{CompileOutput, CompilerExecutor};

/// Default compiler binary name
pub const DEFAULT_COMPILER: &str = "veloc";

/// [`CompilerExecutor`] that spawns real processes
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    compiler: PathBuf,
    archiver: PathBuf,
}

impl ProcessCompiler {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            archiver: PathBuf::from("ar"),
        }
    }

    pub fn with_archiver(mut self, archiver: impl Into<PathBuf>) -> Self {
        self.archiver = archiver.into();
        self
    }

    pub fn compiler_path(&self) -> &Path {
        &self.compiler
    }

    /// Whether the compiler responds to `--version`
    pub fn is_available(&self) -> bool {
        Command::new(&self.compiler)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn run(&self, mut command: Command) -> io::Result<CompileOutput> {
        let start = Instant::now();
        let output = command.output()?;
        let duration = start.elapsed();
        Ok(CompileOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}

impl CompilerExecutor for ProcessCompiler {
    fn compile(
        &self,
        sources: &[PathBuf],
        output: &Path,
        flags: &[String],
    ) -> io::Result<CompileOutput> {
        let mut command = Command::new(&self.compiler);
        command.args(sources).arg("-o").arg(output).args(flags);
        debug!(output = %output.display(), sources = sources.len(), "invoking compiler");
        self.run(command)
    }

    fn archive(&self, objects: &[PathBuf], output: &Path) -> io::Result<CompileOutput> {
        let mut command = Command::new(&self.archiver);
        command.arg("rcs").arg(output).args(objects);
        debug!(output = %output.display(), objects = objects.len(), "invoking archiver");
        self.run(command)
    }

    fn identity(&self) -> ToolchainIdentity {
        let version = Command::new(&self.compiler)
            .arg("--version")
            .output()
            .ok()
            .filter(|output| output.status.success())
            .map(|output| {
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string()
            })
            .unwrap_or_else(|| "unknown".to_string());

        // hashing the binary itself catches same-version rebuilds of the
        // compiler; an unresolvable path leaves the hash empty
        let binary_hash = resolve_binary(&self.compiler)
            .and_then(|path| hash::digest_file(&path).ok())
            .unwrap_or_default();

        ToolchainIdentity::new(version, binary_hash)
    }
}

/// Resolve a compiler invocation name to an on-disk binary via PATH
fn resolve_binary(compiler: &Path) -> Option<PathBuf> {
    if compiler.components().count() > 1 {
        return compiler.is_file().then(|| compiler.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(compiler))
        .find(|candidate| candidate.is_file())
}
