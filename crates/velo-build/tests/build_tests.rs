//! End-to-end pipeline tests
//!
//! Runs the orchestrator against real temp projects with a mock compiler
//! that writes deterministic artifacts, covering the incremental-build
//! lifecycle: first build, no-op rebuild, source edits, flag changes,
//! transitive dirtiness, cycles, and dry runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use velo_build::{
    BuildError, BuildOptions, CompileOutput, CompilerExecutor, FailurePolicy, Orchestrator,
    TargetStatus, TextImportScanner,
};
use velo_state::{DirtyReason, ToolchainIdentity};

/// Compiler fake: concatenates source bytes and flags into the output file,
/// so artifacts change exactly when inputs do, and logs every invocation.
#[derive(Clone)]
struct MockCompiler {
    log: Arc<Mutex<Vec<String>>>,
    version: String,
}

impl MockCompiler {
    fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            version: "mock-1.0".to_string(),
        }
    }

    fn with_version(version: &str) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            version: version.to_string(),
        }
    }

    fn invocations(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl CompilerExecutor for MockCompiler {
    fn compile(
        &self,
        sources: &[PathBuf],
        output: &Path,
        flags: &[String],
    ) -> io::Result<CompileOutput> {
        let mut content = Vec::new();
        for source in sources {
            content.extend(fs::read(source)?);
        }
        content.extend(flags.join(" ").into_bytes());
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, content)?;
        self.log
            .lock()
            .unwrap()
            .push(output.file_name().unwrap().to_string_lossy().into_owned());
        Ok(CompileOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    fn archive(&self, objects: &[PathBuf], output: &Path) -> io::Result<CompileOutput> {
        let mut content = Vec::new();
        for object in objects {
            content.extend(fs::read(object)?);
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, content)?;
        self.log
            .lock()
            .unwrap()
            .push(output.file_name().unwrap().to_string_lossy().into_owned());
        Ok(CompileOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }

    fn identity(&self) -> ToolchainIdentity {
        ToolchainIdentity::new(self.version.clone(), "")
    }
}

/// Compiler fake that fails for selected targets (matched by output stem)
#[derive(Clone)]
struct FailingCompiler {
    inner: MockCompiler,
    fail_outputs: Vec<String>,
}

impl CompilerExecutor for FailingCompiler {
    fn compile(
        &self,
        sources: &[PathBuf],
        output: &Path,
        flags: &[String],
    ) -> io::Result<CompileOutput> {
        let stem = output.file_stem().unwrap().to_string_lossy().into_owned();
        if self.fail_outputs.contains(&stem) {
            return Ok(CompileOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("{stem}.velo:1:1: error: does not compile\n"),
                duration: Duration::from_millis(1),
            });
        }
        self.inner.compile(sources, output, flags)
    }

    fn archive(&self, objects: &[PathBuf], output: &Path) -> io::Result<CompileOutput> {
        self.inner.archive(objects, output)
    }

    fn identity(&self) -> ToolchainIdentity {
        self.inner.identity()
    }
}

fn write_file(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn options(root: &Path) -> BuildOptions {
    BuildOptions {
        project_root: root.to_path_buf(),
        jobs: 2,
        ..BuildOptions::default()
    }
}

/// A fresh "session": new orchestrator with empty in-memory caches
fn session(root: &Path, compiler: &MockCompiler) -> Orchestrator {
    Orchestrator::new(options(root))
        .with_compiler(compiler.clone())
        .with_scanner(TextImportScanner::new())
}

const SINGLE_TARGET: &str = r#"{
    project: { name: `demo` },
    targets: [
        { name: `app`, sources: [`src/main.velo`] },
    ],
}"#;

#[test]
fn test_first_build() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    let driver = session(root, &compiler);
    let report = driver.build().unwrap();

    assert!(report.success);
    assert_eq!(report.built_targets, 1);
    assert_eq!(report.dirty_reasons["app"], DirtyReason::MissingArtifact);
    assert_eq!(compiler.invocations(), 1);

    // artifact and manifest on disk
    assert!(root.join(".velo/build/app").exists());
    let record = driver.state_manager().get_record("app").unwrap();
    assert!(record.source_hash.starts_with("sha256:"));
    assert_eq!(
        record.command_hash,
        driver.state_manager().hash_flags(&[])
    );
    assert!(driver.state_manager().state_path().exists());
}

#[test]
fn test_noop_rebuild() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    session(root, &compiler).build().unwrap();
    assert_eq!(compiler.invocations(), 1);

    let manifest_before = fs::read_to_string(root.join(".velo/.velo_build_state")).unwrap();

    // second session, nothing changed
    let report = session(root, &compiler).build().unwrap();
    assert!(report.success);
    assert_eq!(report.built_targets, 0);
    assert_eq!(report.skipped_targets, report.total_targets);
    assert!(report.dirty_reasons.is_empty());
    assert_eq!(compiler.invocations(), 1, "no compile on a clean rebuild");
    assert!((report.cache_hit_rate() - 1.0).abs() < f64::EPSILON);

    let manifest_after = fs::read_to_string(root.join(".velo/.velo_build_state")).unwrap();
    assert_eq!(manifest_before, manifest_after);
}

#[test]
fn test_source_edit_triggers_rebuild() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    let first = session(root, &compiler);
    first.build().unwrap();
    let before = first.state_manager().get_record("app").unwrap();

    write_file(root, "src/main.velo", "fn main() { edited(); }\n");

    let driver = session(root, &compiler);
    let report = driver.build().unwrap();
    assert_eq!(report.dirty_reasons["app"], DirtyReason::SourceChanged);
    assert_eq!(report.built_targets, 1);
    assert_eq!(compiler.invocations(), 2);

    let after = driver.state_manager().get_record("app").unwrap();
    assert_ne!(before.source_hash, after.source_hash);
}

#[test]
fn test_flag_change_triggers_rebuild() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    session(root, &compiler).build().unwrap();

    let mut with_flag = options(root);
    with_flag.global_flags = vec!["-O2".to_string()];
    let driver = Orchestrator::new(with_flag)
        .with_compiler(compiler.clone())
        .with_scanner(TextImportScanner::new());
    let report = driver.build().unwrap();

    assert_eq!(report.dirty_reasons["app"], DirtyReason::FlagsChanged);
    assert_eq!(report.built_targets, 1);
    assert_eq!(compiler.invocations(), 2);
}

#[test]
fn test_toolchain_change_triggers_rebuild() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    session(root, &MockCompiler::new()).build().unwrap();

    let upgraded = MockCompiler::with_version("mock-2.0");
    let report = session(root, &upgraded).build().unwrap();
    assert_eq!(report.dirty_reasons["app"], DirtyReason::ToolchainChanged);
    assert_eq!(report.built_targets, 1);
}

const LIB_AND_APP: &str = r#"{
    targets: [
        { name: `lib`, type: library, sources: [`src/u.velo`] },
        { name: `app`, sources: [`src/m.velo`], deps: [`lib`] },
    ],
}"#;

#[test]
fn test_transitive_dirty() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", LIB_AND_APP);
    write_file(root, "src/u.velo", "fn util() {}\n");
    write_file(root, "src/m.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    let report = session(root, &compiler).build().unwrap();
    assert_eq!(report.built_targets, 2);
    // library path: one object compile + one archive + app compile
    assert_eq!(compiler.invocations(), 3);
    assert!(root.join(".velo/build/liblib.a").exists());
    assert!(root.join(".velo/build/obj/lib/u.o").exists());

    // edit the library source only
    write_file(root, "src/u.velo", "fn util() { edited(); }\n");

    let report = session(root, &compiler).build().unwrap();
    assert_eq!(report.dirty_reasons["lib"], DirtyReason::SourceChanged);
    assert_eq!(report.dirty_reasons["app"], DirtyReason::DependencyDirty);
    assert_eq!(report.built_targets, 2);
    assert_eq!(report.statuses["lib"], TargetStatus::Built);
    assert_eq!(report.statuses["app"], TargetStatus::Built);
}

#[test]
fn test_cycle_fails_planning() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "build.vbc",
        r#"{
            targets: [
                { name: `a`, sources: [`a.velo`], deps: [`b`] },
                { name: `b`, sources: [`b.velo`], deps: [`a`] },
            ],
        }"#,
    );
    write_file(root, "a.velo", "");
    write_file(root, "b.velo", "");

    let compiler = MockCompiler::new();
    let err = session(root, &compiler).build().unwrap_err();
    match &err {
        BuildError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
    assert_eq!(compiler.invocations(), 0);
}

#[test]
fn test_scanned_import_creates_edge() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    // no declared deps; `use lib` in the source supplies the edge
    write_file(
        root,
        "build.vbc",
        r#"{
            targets: [
                { name: `lib`, type: object, sources: [`u.velo`] },
                { name: `app`, sources: [`m.velo`] },
            ],
        }"#,
    );
    write_file(root, "u.velo", "fn util() {}\n");
    write_file(root, "m.velo", "use lib\nfn main() {}\n");

    let compiler = MockCompiler::new();
    session(root, &compiler).build().unwrap();

    // editing lib must now propagate to app
    write_file(root, "u.velo", "fn util() { edited(); }\n");
    let report = session(root, &compiler).build().unwrap();
    assert_eq!(report.dirty_reasons["app"], DirtyReason::DependencyDirty);
    assert_eq!(report.built_targets, 2);
}

#[test]
fn test_dry_run_compiles_nothing_and_keeps_state() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    let driver = session(root, &compiler);
    let report = driver.check().unwrap();

    assert_eq!(compiler.invocations(), 0);
    assert_eq!(report.built_targets, 1, "dry run reports what would build");
    assert!(!driver.state_manager().state_path().exists());
    assert!(driver.state_manager().get_record("app").is_none());
}

#[test]
fn test_build_failure_reports_stderr_verbatim() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = FailingCompiler {
        inner: MockCompiler::new(),
        fail_outputs: vec!["app".to_string()],
    };
    let driver = Orchestrator::new(options(root))
        .with_compiler(compiler)
        .with_scanner(TextImportScanner::new());
    let report = driver.build().unwrap();

    assert!(!report.success);
    assert_eq!(report.failed_targets, 1);
    assert!(report.errors[0].contains("failed to build app"));
    assert!(report.errors[0].contains("does not compile"));
    // failed build writes no record
    assert!(driver.state_manager().get_record("app").is_none());
}

#[test]
fn test_keep_going_builds_independent_subgraph() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "build.vbc",
        r#"{
            targets: [
                { name: `broken`, sources: [`x.velo`] },
                { name: `fine`, sources: [`y.velo`] },
            ],
        }"#,
    );
    write_file(root, "x.velo", "");
    write_file(root, "y.velo", "");

    let compiler = FailingCompiler {
        inner: MockCompiler::new(),
        fail_outputs: vec!["broken".to_string()],
    };
    let mut opts = options(root);
    opts.failure_policy = FailurePolicy::KeepGoing;
    let driver = Orchestrator::new(opts)
        .with_compiler(compiler)
        .with_scanner(TextImportScanner::new());
    let report = driver.build().unwrap();

    assert!(!report.success);
    assert_eq!(report.statuses["broken"], TargetStatus::Failed);
    assert_eq!(report.statuses["fine"], TargetStatus::Built);
}

#[test]
fn test_clean_then_rebuild() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", SINGLE_TARGET);
    write_file(root, "src/main.velo", "fn main() {}\n");

    let compiler = MockCompiler::new();
    let driver = session(root, &compiler);
    driver.build().unwrap();
    assert!(root.join(".velo/build/app").exists());

    driver.clean().unwrap();
    assert!(!root.join(".velo/build").exists());
    assert!(!driver.state_manager().state_path().exists());

    let report = driver.build().unwrap();
    assert_eq!(report.built_targets, 1);
}

#[test]
fn test_missing_build_file() {
    let dir = TempDir::new().unwrap();
    let driver = Orchestrator::new(options(dir.path()));
    let err = driver.build().unwrap_err();
    assert!(matches!(err, BuildError::BuildFileNotFound(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_target_with_no_matching_sources() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "build.vbc",
        "{ targets: [ { name: `app`, sources: [`src/*.velo`] } ] }",
    );

    let err = session(root, &MockCompiler::new()).build().unwrap_err();
    assert!(matches!(err, BuildError::NoSources { target } if target == "app"));
}

#[test]
fn test_unknown_dependency() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(
        root,
        "build.vbc",
        "{ targets: [ { name: `app`, sources: [`m.velo`], deps: [`ghost`] } ] }",
    );
    write_file(root, "m.velo", "");

    let err = session(root, &MockCompiler::new()).build().unwrap_err();
    assert!(matches!(err, BuildError::MissingDependency { .. }));
}

#[test]
fn test_dependency_graph_dot() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", LIB_AND_APP);
    write_file(root, "src/u.velo", "");
    write_file(root, "src/m.velo", "");

    let dot = session(root, &MockCompiler::new())
        .dependency_graph_dot()
        .unwrap();
    assert!(dot.contains("\"app\" -> \"lib\";"));
}

#[test]
fn test_list_targets() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_file(root, "build.vbc", LIB_AND_APP);

    let targets = session(root, &MockCompiler::new()).list_targets().unwrap();
    assert_eq!(targets.len(), 2);
    assert!(targets[0].output_path.ends_with("liblib.a"));
    assert!(targets[1].output_path.ends_with("app"));
}
