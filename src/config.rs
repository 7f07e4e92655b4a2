//! Configuration for a single runner process.

use crate::backend::BackendChoice;
use crate::error::ConfigError;
use crate::output::OutputShape;
use clap::ValueEnum;
use std::path::PathBuf;

/// Out-of-band bookkeeping arguments passed by the executor.
///
/// Only switches on the per-iteration marker lines; never changes what is
/// measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumentation {
    /// Directory the executor collects instrumentation data in.
    pub dir: PathBuf,
    /// Benchmark key, `benchmark:vm:variant`.
    pub key: String,
    /// Index of this process execution for `key`.
    pub key_pexec_index: usize,
}

/// Configuration for one run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Path to a shared library exporting `run_iter`, or the name of a
    /// compiled-in benchmark.
    pub benchmark: String,
    /// Number of in-process iterations.
    pub iterations: usize,
    /// Passed unchanged to every `run_iter` call.
    pub param: i32,
    /// Print progress lines to stderr.
    pub debug: bool,
    pub instrumentation: Option<Instrumentation>,
    pub backend: BackendChoice,
    /// Output shape; `None` picks the natural shape for the backend.
    pub shape: Option<OutputShape>,
    /// Where to load `libkruntime` from for the snapshot backend.
    pub kruntime_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            benchmark: String::new(),
            iterations: 1,
            param: 0,
            debug: false,
            instrumentation: None,
            backend: BackendChoice::default(),
            shape: None,
            kruntime_path: PathBuf::from("libkruntime.so"),
        }
    }
}

impl RunConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden from the process environment.
    ///
    /// Supported variables:
    /// - `ITERS_BACKEND`: `wallclock`, `tsc`, `msr` or `kruntime`
    /// - `ITERS_SHAPE`: `flat`, `nested` or `keyed`
    /// - `ITERS_KRUNTIME_LIB`: path to `libkruntime`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("ITERS_BACKEND") {
            cfg.backend = parse_choice("ITERS_BACKEND", &v)?;
        }
        if let Some(v) = lookup("ITERS_SHAPE") {
            cfg.shape = Some(parse_choice("ITERS_SHAPE", &v)?);
        }
        if let Some(v) = lookup("ITERS_KRUNTIME_LIB") {
            cfg.kruntime_path = PathBuf::from(v);
        }

        Ok(cfg)
    }

    /// Set the benchmark to run.
    pub fn benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = benchmark.into();
        self
    }

    /// Set the number of iterations.
    pub fn iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    /// Set the benchmark parameter.
    pub fn param(mut self, param: i32) -> Self {
        self.param = param;
        self
    }

    /// Set progress output.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable instrumentation markers.
    pub fn instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Set the measurement backend.
    pub fn backend(mut self, backend: BackendChoice) -> Self {
        self.backend = backend;
        self
    }

    /// Force an output shape.
    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Set the `libkruntime` location.
    pub fn kruntime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kruntime_path = path.into();
        self
    }

    /// Check the config before any backend or benchmark is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.benchmark.is_empty() {
            return Err(ConfigError::MissingBenchmark);
        }
        if self.iterations == 0 {
            return Err(ConfigError::NonPositiveIterations(0));
        }
        if let Some(inst) = &self.instrumentation {
            if inst.key.is_empty() || inst.dir.as_os_str().is_empty() {
                return Err(ConfigError::IncompleteInstrumentation);
            }
        }
        Ok(())
    }
}

fn parse_choice<T: ValueEnum>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    T::from_str(value.trim(), true).map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
