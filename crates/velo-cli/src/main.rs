//! velo-make command-line interface
//!
//! Exit codes: 0 on success, 1 on build failure, 2 on configuration or
//! usage errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use velo_build::{
    BuildError, BuildOptions, BuildPhase, BuildReport, FailurePolicy, Orchestrator,
    ProgressObserver,
};

#[derive(Parser)]
#[command(name = "velo-make")]
#[command(about = "Incremental build driver for Velo projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Change to this directory before building
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Build description file
    #[arg(short = 'f', long = "file", global = true, default_value = "build.vbc")]
    build_file: PathBuf,

    /// Number of parallel jobs (default: hardware parallelism)
    #[arg(short = 'j', long = "jobs", global = true, default_value_t = 0)]
    jobs: usize,

    /// Rebuild everything, ignoring recorded state
    #[arg(long, global = true)]
    force: bool,

    /// Continue building independent targets after a failure
    #[arg(long, global = true)]
    keep_going: bool,

    /// Plan and report without compiling
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, global = true)]
    verbose: bool,

    /// Only report errors
    #[arg(short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build the project (default)
    Build,
    /// Remove build artifacts and state
    Clean,
    /// Clean, then build from scratch
    Rebuild,
    /// Show what would be built
    Check,
    /// List all targets
    Targets,
    /// Print the dependency graph in DOT format
    Deps,
}

/// Prints per-phase and per-target progress lines
struct ConsoleObserver {
    verbose: bool,
    quiet: bool,
}

impl ProgressObserver for ConsoleObserver {
    fn phase_started(&self, phase: BuildPhase) {
        if self.verbose && phase != BuildPhase::Complete {
            eprintln!("{} {phase}...", "::".dimmed());
        }
    }

    fn target_started(&self, name: &str) {
        if !self.quiet {
            println!("  {} {name}", "building".cyan());
        }
    }

    fn target_finished(&self, name: &str, success: bool, duration: Duration) {
        if self.quiet {
            return;
        }
        if success {
            println!(
                "  {} {name} ({:.2}s)",
                "finished".green(),
                duration.as_secs_f64()
            );
        } else {
            println!("  {} {name}", "FAILED".red().bold());
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)?;
    }

    let options = BuildOptions {
        build_file: cli.build_file.clone(),
        jobs: cli.jobs,
        force_rebuild: cli.force,
        failure_policy: if cli.keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        },
        dry_run: cli.dry_run,
        ..BuildOptions::default()
    };

    let driver = Orchestrator::new(options).with_observer(ConsoleObserver {
        verbose: cli.verbose,
        quiet: cli.quiet,
    });

    match cli.command.unwrap_or(Command::Build) {
        Command::Build => report_outcome(driver.build(), cli.quiet),
        Command::Rebuild => report_outcome(driver.rebuild(), cli.quiet),
        Command::Check => report_outcome(driver.check(), cli.quiet),
        Command::Clean => match driver.clean() {
            Ok(()) => {
                if !cli.quiet {
                    println!("cleaned");
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => fail(error),
        },
        Command::Targets => match driver.list_targets() {
            Ok(targets) => {
                for target in targets {
                    println!(
                        "{:<24} {:<8} {}",
                        target.name,
                        target.kind.to_string(),
                        target.output_path.display()
                    );
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => fail(error),
        },
        Command::Deps => match driver.dependency_graph_dot() {
            Ok(dot) => {
                print!("{dot}");
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => fail(error),
        },
    }
}

fn report_outcome(
    result: Result<BuildReport, BuildError>,
    quiet: bool,
) -> Result<ExitCode> {
    let report = match result {
        Ok(report) => report,
        Err(error) => return fail(error),
    };

    for message in &report.errors {
        eprintln!("{}", message.red());
    }

    if !quiet {
        let summary = format!(
            "{} built, {} up to date, {} failed in {:.2}s",
            report.built_targets,
            report.skipped_targets,
            report.failed_targets,
            report.total_time.as_secs_f64()
        );
        if report.success {
            println!("{} {summary}", "ok:".green().bold());
        } else {
            println!("{} {summary}", "failed:".red().bold());
        }
    }

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn fail(error: BuildError) -> Result<ExitCode> {
    eprintln!("{} {error}", "error:".red().bold());
    if let BuildError::Config(velo_build::ConfigError::Syntax { diagnostics, .. }) = &error {
        for diagnostic in diagnostics {
            eprintln!("  {diagnostic}");
        }
    }
    Ok(ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(1)))
}
