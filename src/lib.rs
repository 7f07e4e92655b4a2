//! # iteration-runner
//!
//! An in-process iteration runner for micro-benchmarks.
//!
//! A runner process executes one benchmark's `run_iter(param)` entry point a
//! fixed number of times, brackets every call with backend readings
//! (wallclock, core cycles, APERF/MPERF, optionally per core), checks that
//! no reading moved backwards, and prints the per-iteration deltas as JSON
//! for an external statistics pipeline. Spawning, pinning and repeating
//! runner processes is the executor's job, not this crate's.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iteration_runner::{benchmark, runner_main};
//!
//! #[benchmark]
//! fn spin(n: i32) {
//!     for i in 0..n {
//!         std::hint::black_box(i);
//!     }
//! }
//!
//! runner_main!();
//! ```
//!
//! ```text
//! $ my-runner spin 10 1000 0 --backend tsc
//! [[0.000012,...],[31021.0,...]]
//! ```
//!
//! Benchmarks can also be shared libraries exporting
//! `void run_iter(int)`; pass their path instead of a name.

extern crate self as iteration_runner;

pub mod backend;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod output;
pub mod report;
pub mod runner;
pub mod sample;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{Backend, BackendChoice, MetricKind, MonotonicClock, Reading, Slot};
pub use buffer::{Layout, ResultMatrix, Series, SENTINEL};
pub use config::{Instrumentation, RunConfig};
pub use entry::{find_benchmark, list_benchmarks, load_benchmark, Benchmark, LoadedBenchmark};
pub use error::{BackendError, BenchmarkError, ConfigError, MeasureError, OutputError, RunError};
pub use output::{render, write_output, OutputShape};
pub use report::{ConsoleReporter, InstrumentationReporter, MultiReporter, Reporter};
pub use runner::{IterationRunner, Phase};

pub use iteration_runner_macros::{benchmark, runner_main};

#[doc(hidden)]
pub mod __private {
    pub use crate::entry::{BenchmarkEntry, BENCHMARKS};
    pub use linkme;
}
