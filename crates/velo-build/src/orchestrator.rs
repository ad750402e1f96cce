//! The build pipeline
//!
//! Composes the parser, state manager, dependency analyzer, and scheduler:
//! parse, interpolate, load state, expand sources, scan imports, build the
//! graph, detect cycles, mark dirty with propagation, execute, save state.
//! Every stage gates the next; planning problems surface as errors while
//! per-target build failures accumulate into the [`BuildReport`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use velo_config::{ConfigModel, TargetKind, TargetSpec};
use velo_state::{DependencyInfo, DirtyReason, StateManager};

use crate::adapters::{CompilerExecutor, GlobOptions, ImportScanner, SourceExpander};
use crate::compiler::{ProcessCompiler, DEFAULT_COMPILER};
use crate::error::{BuildError, BuildResult};
use crate::glob::WalkdirExpander;
use crate::graph::DependencyGraph;
use crate::progress::{BuildPhase, NullObserver, ProgressObserver};
use crate::scan::CompilerImportScanner;
use crate::scheduler::{
    FailurePolicy, ScheduleOutcome, Scheduler, TargetBuilder, TargetOutcome, TargetStatus,
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_root: PathBuf,
    /// Build description, relative to the project root
    pub build_file: PathBuf,
    /// Artifact directory, relative to the project root
    pub output_dir: PathBuf,
    /// State directory, relative to the project root
    pub state_dir: PathBuf,
    /// Compiler binary name or path
    pub compiler: PathBuf,
    /// Flags applied to every target, before target-specific flags
    pub global_flags: Vec<String>,
    /// Worker budget; 0 means hardware parallelism
    pub jobs: usize,
    pub force_rebuild: bool,
    pub failure_policy: FailurePolicy,
    pub dry_run: bool,
    /// Options observed during source expansion
    pub glob: GlobOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            build_file: PathBuf::from("build.vbc"),
            output_dir: PathBuf::from(".velo/build"),
            state_dir: PathBuf::from(".velo"),
            compiler: PathBuf::from(DEFAULT_COMPILER),
            global_flags: Vec::new(),
            jobs: 0,
            force_rebuild: false,
            failure_policy: FailurePolicy::default(),
            dry_run: false,
            glob: GlobOptions::default(),
        }
    }
}

impl BuildOptions {
    /// Resolve the worker budget (hardware parallelism when unset)
    pub fn worker_budget(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Result of one pipeline run
#[derive(Debug, Default)]
pub struct BuildReport {
    pub success: bool,
    pub total_targets: usize,
    pub built_targets: usize,
    pub skipped_targets: usize,
    pub failed_targets: usize,
    /// Accumulated error and warning messages, in occurrence order
    pub errors: Vec<String>,
    /// Why each dirty target was dirty
    pub dirty_reasons: BTreeMap<String, DirtyReason>,
    /// Final status per target
    pub statuses: BTreeMap<String, TargetStatus>,
    /// Per-target build durations, in completion order
    pub target_times: Vec<(String, Duration)>,
    pub total_time: Duration,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_targets == 0 {
            return 0.0;
        }
        self.skipped_targets as f64 / self.total_targets as f64
    }
}

/// The build driver
pub struct Orchestrator {
    options: BuildOptions,
    state: StateManager,
    expander: Box<dyn SourceExpander>,
    scanner: Box<dyn ImportScanner>,
    compiler: Box<dyn CompilerExecutor>,
    observer: Box<dyn ProgressObserver>,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(options: BuildOptions) -> Self {
        let state = StateManager::new(options.project_root.join(&options.state_dir));
        let scanner = CompilerImportScanner::new(&options.compiler);
        let compiler = ProcessCompiler::new(&options.compiler);
        Self {
            state,
            expander: Box::new(WalkdirExpander::new()),
            scanner: Box::new(scanner),
            compiler: Box::new(compiler),
            observer: Box::new(NullObserver),
            cancel: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    pub fn with_expander(mut self, expander: impl SourceExpander + 'static) -> Self {
        self.expander = Box::new(expander);
        self
    }

    pub fn with_scanner(mut self, scanner: impl ImportScanner + 'static) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    pub fn with_compiler(mut self, compiler: impl CompilerExecutor + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    /// Flag a host can set from another thread to stop the build
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Run the full pipeline
    pub fn build(&self) -> BuildResult<BuildReport> {
        self.build_inner(self.options.force_rebuild, self.options.dry_run)
    }

    /// Remove artifacts and state
    pub fn clean(&self) -> BuildResult<()> {
        let output_dir = self.options.project_root.join(&self.options.output_dir);
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir).map_err(|e| BuildError::io(&output_dir, e))?;
        }
        self.state.clear();
        let state_file = self.state.state_path();
        if state_file.exists() {
            fs::remove_file(state_file).map_err(|e| BuildError::io(state_file, e))?;
        }
        Ok(())
    }

    /// Clean, then build everything from scratch
    pub fn rebuild(&self) -> BuildResult<BuildReport> {
        self.clean()?;
        self.build_inner(true, self.options.dry_run)
    }

    /// Report what a build would do without compiling or mutating state
    pub fn check(&self) -> BuildResult<BuildReport> {
        self.build_inner(self.options.force_rebuild, true)
    }

    /// Targets from the build description, with derived output paths
    pub fn list_targets(&self) -> BuildResult<Vec<TargetSpec>> {
        let model = self.load_model()?;
        let output_dir = self.options.project_root.join(&self.options.output_dir);
        Ok(model
            .targets
            .into_iter()
            .map(|mut target| {
                target.output_path = target.derive_output_path(&output_dir);
                target
            })
            .collect())
    }

    /// Dependency graph in Graphviz DOT format
    pub fn dependency_graph_dot(&self) -> BuildResult<String> {
        let model = self.load_model()?;
        let targets = self.expand_targets(model.targets)?;
        let scanned = self.scan_imports(&targets);
        let graph = DependencyGraph::build(&targets, &scanned)?;
        Ok(graph.to_dot())
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    fn build_inner(&self, force_rebuild: bool, dry_run: bool) -> BuildResult<BuildReport> {
        let start = Instant::now();
        let mut report = BuildReport::default();

        // parse + interpolate
        self.observer.phase_started(BuildPhase::Parsing);
        let model = self.load_model()?;
        if model.targets.is_empty() {
            return Err(BuildError::NoTargets);
        }

        // previous state; a broken state file costs a rebuild, not the build
        self.observer.phase_started(BuildPhase::LoadingState);
        if let Err(error) = self.state.load() {
            warn!(%error, "ignoring unreadable build state");
            report.errors.push(format!("warning: {error}"));
        }
        self.state.set_toolchain(self.compiler.identity());

        // resolve patterns to source files
        self.observer.phase_started(BuildPhase::Expanding);
        let targets = self.expand_targets(model.targets)?;
        report.total_targets = targets.len();

        // imports + graph + cycle check
        self.observer.phase_started(BuildPhase::Analyzing);
        let scanned = self.scan_imports(&targets);
        let graph = DependencyGraph::build(&targets, &scanned)?;

        // dirty marking with propagation
        self.observer.phase_started(BuildPhase::CheckingDirty);
        let by_name: BTreeMap<String, TargetSpec> = targets
            .into_iter()
            .map(|target| (target.name.clone(), target))
            .collect();

        let mut initial: BTreeSet<String> = BTreeSet::new();
        for name in graph.order() {
            let target = &by_name[name];
            if force_rebuild {
                initial.insert(name.clone());
                continue;
            }
            let flags = self.combined_flags(target);
            let reason =
                self.state
                    .check_dirty(name, &target.output_path, &target.sources, &flags);
            debug!(target = %name, reason = %reason, "dirty check");
            if !reason.is_clean() {
                initial.insert(name.clone());
                report.dirty_reasons.insert(name.clone(), reason);
            }
        }

        let dirty = graph.dirty_closure(&initial);
        for name in &dirty {
            if !initial.contains(name) {
                self.state.mark_dirty(name);
                report
                    .dirty_reasons
                    .insert(name.clone(), DirtyReason::DependencyDirty);
            }
        }
        info!(
            dirty = dirty.len(),
            total = report.total_targets,
            "change analysis complete"
        );

        // execute
        self.observer.phase_started(BuildPhase::Compiling);
        if !dry_run && !dirty.is_empty() {
            let output_dir = self.options.project_root.join(&self.options.output_dir);
            fs::create_dir_all(&output_dir).map_err(|e| BuildError::io(&output_dir, e))?;
        }

        let builder = DriverBuilder {
            orchestrator: self,
            targets: &by_name,
            graph: &graph,
            dry_run,
        };
        let scheduler = Scheduler::new(&graph, dirty, self.options.worker_budget())
            .with_policy(self.options.failure_policy)
            .with_cancel_flag(Arc::clone(&self.cancel));
        let outcome = scheduler.run(&builder, self.observer.as_ref());
        self.absorb_outcome(&mut report, outcome);

        // persist
        self.observer.phase_started(BuildPhase::SavingState);
        if !dry_run {
            if let Err(error) = self.state.save() {
                // completed work stays valid; only the next session pays
                warn!(%error, "could not save build state");
                report.errors.push(format!("warning: {error}"));
            }
        }

        report.total_time = start.elapsed();
        self.observer.phase_started(BuildPhase::Complete);
        Ok(report)
    }

    fn load_model(&self) -> BuildResult<ConfigModel> {
        let path = self.options.project_root.join(&self.options.build_file);
        if !path.exists() {
            return Err(BuildError::BuildFileNotFound(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
        let label = self.options.build_file.to_string_lossy();
        Ok(velo_config::load_model(&text, &label)?)
    }

    fn expand_targets(&self, targets: Vec<TargetSpec>) -> BuildResult<Vec<TargetSpec>> {
        let output_dir = self.options.project_root.join(&self.options.output_dir);
        let mut expanded = Vec::with_capacity(targets.len());
        for mut target in targets {
            target.output_path = target.derive_output_path(&output_dir);

            let mut sources = Vec::new();
            for pattern in &target.source_patterns {
                let matched = self
                    .expander
                    .expand(&self.options.project_root, pattern, &self.options.glob)
                    .map_err(|error| BuildError::expansion(pattern, error.message))?;
                sources.extend(matched);
            }
            sources.sort();
            sources.dedup();
            if sources.is_empty() {
                return Err(BuildError::NoSources {
                    target: target.name,
                });
            }
            target.sources = sources;
            expanded.push(target);
        }
        Ok(expanded)
    }

    fn scan_imports(&self, targets: &[TargetSpec]) -> HashMap<String, Vec<String>> {
        let mut scanned = HashMap::new();
        for target in targets {
            let mut imports = Vec::new();
            for source in &target.sources {
                match self.scanner.scan(source) {
                    Ok(names) => imports.extend(names),
                    Err(error) => {
                        warn!(source = %source.display(), %error, "import scan failed");
                    }
                }
            }
            scanned.insert(target.name.clone(), imports);
        }
        scanned
    }

    fn combined_flags(&self, target: &TargetSpec) -> Vec<String> {
        let mut flags = self.options.global_flags.clone();
        flags.extend(target.flags.iter().cloned());
        flags
    }

    fn absorb_outcome(&self, report: &mut BuildReport, outcome: ScheduleOutcome) {
        report.built_targets = outcome.built();
        report.failed_targets = outcome.failed();
        report.skipped_targets = outcome.skipped();
        report.cancelled = outcome.cancelled;
        for (name, stderr) in &outcome.failures {
            let stderr = stderr.trim_end();
            report.errors.push(format!("failed to build {name}: {stderr}"));
        }
        if outcome.cancelled {
            report.errors.push("build cancelled".to_string());
        }
        report.success = outcome.success();
        report.target_times = outcome.target_times;
        report.statuses = outcome.statuses;
    }
}

/// Builds one target: compile (or compile-then-archive for libraries),
/// then record the result. Runs on worker threads; takes no scheduler
/// state and holds no state lock while the compiler runs.
struct DriverBuilder<'a> {
    orchestrator: &'a Orchestrator,
    targets: &'a BTreeMap<String, TargetSpec>,
    graph: &'a DependencyGraph,
    dry_run: bool,
}

impl DriverBuilder<'_> {
    fn compile_target(&self, target: &TargetSpec, flags: &[String]) -> std::io::Result<crate::adapters::CompileOutput> {
        let compiler = self.orchestrator.compiler.as_ref();
        match target.kind {
            TargetKind::Library => self.build_library(target, flags),
            TargetKind::Binary | TargetKind::Object => {
                compiler.compile(&target.sources, &target.output_path, flags)
            }
        }
    }

    /// Compile each source to an object file, then archive
    fn build_library(
        &self,
        target: &TargetSpec,
        flags: &[String],
    ) -> std::io::Result<crate::adapters::CompileOutput> {
        let compiler = self.orchestrator.compiler.as_ref();
        let output_dir = self
            .orchestrator
            .options
            .project_root
            .join(&self.orchestrator.options.output_dir);

        let mut object_flags = flags.to_vec();
        object_flags.push("-c".to_string());

        let mut objects = Vec::with_capacity(target.sources.len());
        let mut total = Duration::ZERO;
        for source in &target.sources {
            let object = target.object_path(&output_dir, source);
            if let Some(parent) = object.parent() {
                fs::create_dir_all(parent)?;
            }
            let output =
                compiler.compile(std::slice::from_ref(source), &object, &object_flags)?;
            total += output.duration;
            if !output.success() {
                return Ok(crate::adapters::CompileOutput {
                    duration: total,
                    ..output
                });
            }
            objects.push(object);
        }

        let mut archive = compiler.archive(&objects, &target.output_path)?;
        archive.duration += total;
        Ok(archive)
    }

    /// Dependency artifacts with their content hashes, captured after a
    /// successful build for the record
    fn resolved_dependencies(&self, name: &str) -> Vec<DependencyInfo> {
        let mut deps = Vec::new();
        for dep_name in self.graph.dependencies(name) {
            let Some(dep) = self.targets.get(dep_name) else {
                continue;
            };
            if let Ok(hash) = self.orchestrator.state.hash_file(&dep.output_path) {
                deps.push(DependencyInfo::new(&dep.output_path, hash));
            }
        }
        deps
    }
}

impl TargetBuilder for DriverBuilder<'_> {
    fn build_target(&self, name: &str) -> TargetOutcome {
        let target = &self.targets[name];

        if self.dry_run {
            debug!(target = name, "dry run, skipping compile");
            return TargetOutcome::ok(Duration::ZERO);
        }

        let flags = self.orchestrator.combined_flags(target);
        match self.compile_target(target, &flags) {
            Ok(output) if output.success() => {
                let deps = self.resolved_dependencies(name);
                self.orchestrator.state.update_record(
                    name,
                    &target.output_path,
                    &target.sources,
                    deps,
                    Vec::new(),
                    &flags,
                    output.duration.as_millis() as u64,
                );
                TargetOutcome::ok(output.duration)
            }
            Ok(output) => {
                let stderr = if output.stderr.is_empty() {
                    output.stdout
                } else {
                    output.stderr
                };
                TargetOutcome::failed(stderr, output.duration)
            }
            Err(error) => {
                TargetOutcome::failed(format!("could not run compiler: {error}"), Duration::ZERO)
            }
        }
    }
}
