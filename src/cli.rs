//! Command-line front end shared by `iterations-runner` and `runner_main!()`.
//!
//! ```text
//! iterations-runner <benchmark> <iterations> <param> <debug>
//!                   [<instrument dir> <key> <key pexec index>]
//! ```
//!
//! Results go to stdout once, at the end of a completed run. Everything else
//! (progress lines, instrumentation markers, errors, tracing) goes to stderr.

use crate::backend::{Backend, BackendChoice};
use crate::config::{Instrumentation, RunConfig};
use crate::entry::{list_benchmarks, load_benchmark};
use crate::error::{BackendError, ConfigError};
use crate::output::{write_output, OutputShape};
use crate::runner::IterationRunner;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "iterations-runner",
    version,
    about = "Run one benchmark for a fixed number of in-process iterations",
    long_about = "
Runs a benchmark's run_iter(param) entry point <iterations> times in this
process, timing each call with the selected backend, and prints the
per-iteration deltas to stdout as JSON.

The benchmark is a path to a shared library exporting
`void run_iter(int)`, or the name of a benchmark compiled into this binary
(see --list).

Example:
    iterations-runner ./libfannkuch.so 10 5 1
    iterations-runner fannkuch_redux 10 5 0 --backend tsc
    iterations-runner dummy 3 0 0 /tmp/instr dummy:rust:default 0
"
)]
pub struct Cli {
    // ========================================================================
    // Positional Arguments
    // ========================================================================
    /// Shared library path or registered benchmark name
    #[arg(required_unless_present = "list")]
    pub benchmark: Option<String>,

    /// Number of in-process iterations
    #[arg(required_unless_present = "list", allow_negative_numbers = true)]
    pub iterations: Option<i32>,

    /// Parameter passed to every run_iter call
    #[arg(required_unless_present = "list", allow_negative_numbers = true)]
    pub param: Option<i32>,

    /// Debug flag; values above 0 print progress to stderr
    #[arg(required_unless_present = "list", allow_negative_numbers = true)]
    pub debug: Option<i32>,

    /// Instrumentation directory
    pub instrument_dir: Option<PathBuf>,

    /// Instrumentation key
    pub key: Option<String>,

    /// Instrumentation key pexec index
    pub key_pexec_index: Option<usize>,

    // ========================================================================
    // Measurement
    // ========================================================================
    /// Measurement backend [env: ITERS_BACKEND]
    #[arg(long, value_enum)]
    pub backend: Option<BackendChoice>,

    /// Output shape; defaults to the natural shape for the backend [env: ITERS_SHAPE]
    #[arg(long, value_enum)]
    pub shape: Option<OutputShape>,

    /// Path to libkruntime for the kruntime backend [env: ITERS_KRUNTIME_LIB]
    #[arg(long)]
    pub kruntime: Option<PathBuf>,

    // ========================================================================
    // Discovery
    // ========================================================================
    /// List registered benchmarks and exit
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    fn debug_enabled(&self) -> bool {
        self.debug.is_some_and(|d| d > 0)
    }

    /// Layer the command line over `base`. Arguments win over environment.
    pub fn into_config(self, base: RunConfig) -> Result<RunConfig, ConfigError> {
        let debug = self.debug_enabled();
        let mut cfg = base.debug(debug);

        cfg.benchmark = self.benchmark.ok_or(ConfigError::MissingBenchmark)?;
        let iterations = self.iterations.unwrap_or(0);
        cfg.iterations = usize::try_from(iterations)
            .map_err(|_| ConfigError::NonPositiveIterations(iterations.into()))?;
        cfg.param = self.param.unwrap_or(0);

        cfg.instrumentation = match (self.instrument_dir, self.key, self.key_pexec_index) {
            (None, None, None) => None,
            (Some(dir), Some(key), Some(key_pexec_index)) => Some(Instrumentation {
                dir,
                key,
                key_pexec_index,
            }),
            _ => return Err(ConfigError::IncompleteInstrumentation),
        };

        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }
        if let Some(shape) = self.shape {
            cfg.shape = Some(shape);
        }
        if let Some(path) = self.kruntime {
            cfg.kruntime_path = path;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parse the process arguments, run, and map the outcome to an exit code.
pub fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug_enabled());

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(cli: Cli) -> Result<()> {
    if cli.list {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for name in list_benchmarks() {
            writeln!(out, "{name}")?;
        }
        return Ok(());
    }

    let base = RunConfig::from_env().context("invalid environment")?;
    let config = cli.into_config(base).context("invalid arguments")?;

    execute_with(
        config,
        |cfg| cfg.backend.open(&cfg.kruntime_path),
        io::stdout().lock(),
    )
}

/// Load the benchmark, open the backend, measure and write the results.
///
/// The benchmark is resolved before the backend is opened, so a missing
/// benchmark or entry point never touches the measurement hardware.
/// Nothing is written to `out` unless the run completes.
pub fn execute_with<F, W>(config: RunConfig, open_backend: F, out: W) -> Result<()>
where
    F: FnOnce(&RunConfig) -> Result<Backend, BackendError>,
    W: Write,
{
    config.validate().context("invalid configuration")?;

    let mut bench = load_benchmark(&config.benchmark)
        .with_context(|| format!("failed to load benchmark '{}'", config.benchmark))?;
    let backend = open_backend(&config)
        .with_context(|| format!("failed to open {:?} backend", config.backend))?;

    let forced_shape = config.shape;
    let mut runner = IterationRunner::new(config, backend);
    let results = runner.run(&mut bench).context("measurement aborted")?;

    let shape = forced_shape.unwrap_or_else(|| OutputShape::default_for(results.layout()));
    write_output(&results, shape, out).context("failed to write results")?;
    Ok(())
}
