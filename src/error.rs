//! Error types for every stage of a run.
//!
//! Each stage owns a narrow error enum; [`RunError`] is the umbrella the
//! measurement loop returns. None of these are retried: the caller reports
//! the error and exits nonzero.

use crate::backend::{MetricKind, Reading};
use thiserror::Error;

/// A sample failed validation. Always fatal for the whole run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    /// A "before" reading was greater than its paired "after" reading.
    #[error("{metric} error{}: start={start}, stop={stop}", core_suffix(.core))]
    NonMonotonic {
        metric: MetricKind,
        core: Option<usize>,
        start: Reading,
        stop: Reading,
    },

    /// A wallclock reading, or the delta between two, is infinite or NaN.
    #[error("{metric} error{}: non-finite reading start={start}, stop={stop}", core_suffix(.core))]
    NonFinite {
        metric: MetricKind,
        core: Option<usize>,
        start: Reading,
        stop: Reading,
    },

    /// A counter delta does not fit exactly into an `f64`.
    #[error("loss of precision detected for {metric}{}: {delta} != {}", core_suffix(.core), round_trip(.delta))]
    PrecisionLoss {
        metric: MetricKind,
        core: Option<usize>,
        delta: u64,
    },

    /// The backend paired readings of different kinds.
    #[error("{metric} error{}: mismatched readings start={start}, stop={stop}", core_suffix(.core))]
    MixedReadings {
        metric: MetricKind,
        core: Option<usize>,
        start: Reading,
        stop: Reading,
    },
}

fn core_suffix(core: &Option<usize>) -> String {
    match core {
        Some(core) => format!(" (core {core})"),
        None => String::new(),
    }
}

fn round_trip(delta: &u64) -> u128 {
    *delta as f64 as u128
}

/// Misuse of the result buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("no {metric} row{} in this result matrix", core_suffix(.core))]
    UnknownRow {
        metric: MetricKind,
        core: Option<usize>,
    },

    #[error("{metric}{} iteration {iter} written out of order (next expected {expected})", core_suffix(.core))]
    OutOfOrder {
        metric: MetricKind,
        core: Option<usize>,
        iter: usize,
        expected: usize,
    },

    #[error("iteration {iter} is beyond the {capacity} pre-allocated iterations")]
    Overflow { iter: usize, capacity: usize },
}

/// Backend initialisation, reading or teardown failed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend '{name}' is not available on this platform: {reason}")]
    Unavailable { name: &'static str, reason: String },

    #[error("failed to load measurement library '{path}': {reason}")]
    Library { path: String, reason: String },

    #[error("measurement library '{path}' is missing symbol '{symbol}'")]
    MissingSymbol { path: String, symbol: &'static str },

    #[error("core {core} out of range (backend reports {num_cores} cores)")]
    CoreOutOfRange { core: usize, num_cores: usize },

    #[error("backend reported an invalid core count: {0}")]
    InvalidCoreCount(i64),

    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("backend used before init() or after shutdown()")]
    NotInitialised,

    #[cfg(any(test, feature = "testing"))]
    #[error("scripted backend exhausted after {0} readings")]
    Exhausted(usize),
}

/// The benchmark could not be resolved to a callable entry point.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("can't find benchmark '{0}'")]
    NotFound(String),

    #[error("failed to load benchmark '{path}': {reason}")]
    Load { path: String, reason: String },

    #[error("benchmark '{path}' is missing a 'run_iter' function")]
    MissingEntryPoint { path: String },
}

/// Invalid run configuration, detected before any timing begins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no benchmark given")]
    MissingBenchmark,

    #[error("iteration count must be positive, got {0}")]
    NonPositiveIterations(i64),

    #[error("instrumentation mode needs a directory, a key and a key pexec index")]
    IncompleteInstrumentation,

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Rendering the result matrix failed.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot render {shape} output: {reason}")]
    Unrepresentable {
        shape: &'static str,
        reason: &'static str,
    },

    #[error("failed to serialise results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),
}

/// Any error that ends a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Benchmark(#[from] BenchmarkError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Measure(#[from] MeasureError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
