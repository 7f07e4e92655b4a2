//! Benchmark entry points.
//!
//! A benchmark is anything with a `run_iter(param)` operation. Two sources
//! are supported: functions compiled into the runner binary and registered
//! with `#[benchmark]`, and shared libraries exporting
//! `extern "C" fn run_iter(int)`.

use crate::error::BenchmarkError;
use libloading::Library;
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;

/// The single measured operation of a benchmark.
pub trait Benchmark {
    fn run_iter(&mut self, param: i32);
}

impl<F: FnMut(i32)> Benchmark for F {
    fn run_iter(&mut self, param: i32) {
        self(param)
    }
}

/// A registered benchmark entry.
#[doc(hidden)]
pub struct BenchmarkEntry {
    /// Benchmark name (function name or custom)
    pub name: &'static str,
    /// The benchmark function
    pub func: fn(i32),
    /// Module path where the benchmark is defined
    pub module_path: &'static str,
}

impl BenchmarkEntry {
    fn matches(&self, name: &str) -> bool {
        self.name == name
            || name
                .strip_prefix(self.module_path)
                .and_then(|rest| rest.strip_prefix("::"))
                == Some(self.name)
    }
}

/// Distributed slice collecting all registered benchmarks.
#[doc(hidden)]
#[linkme::distributed_slice]
pub static BENCHMARKS: [BenchmarkEntry];

/// Names of all registered benchmarks, sorted.
pub fn list_benchmarks() -> Vec<&'static str> {
    let mut names: Vec<_> = BENCHMARKS.iter().map(|b| b.name).collect();
    names.sort_unstable();
    names
}

/// Look up a registered benchmark by name or `module::path::name`.
pub fn find_benchmark(name: &str) -> Option<&'static BenchmarkEntry> {
    BENCHMARKS.iter().find(|b| b.matches(name))
}

type RunIterFn = unsafe extern "C" fn(c_int);

/// A shared library exporting `run_iter`.
pub struct DynamicBenchmark {
    path: String,
    run_iter: RunIterFn,
    // Keeps `run_iter` valid.
    _library: Library,
}

impl DynamicBenchmark {
    /// Load a shared library by path or by name (searched the way the
    /// platform loader searches), and resolve `run_iter`.
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, BenchmarkError> {
        let path_str = Path::new(path.as_ref()).display().to_string();

        // SAFETY: benchmark libraries are trusted code; loading them runs
        // their initialisers.
        let library = unsafe { Library::new(path.as_ref()) }.map_err(|e| BenchmarkError::Load {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        // SAFETY: `run_iter` is declared `void run_iter(int)` by contract.
        let run_iter = unsafe { library.get::<RunIterFn>(b"run_iter") }
            .map(|sym| *sym)
            .map_err(|_| BenchmarkError::MissingEntryPoint {
                path: path_str.clone(),
            })?;

        tracing::debug!(path = %path_str, "benchmark library loaded");
        Ok(Self {
            path: path_str,
            run_iter,
            _library: library,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Benchmark for DynamicBenchmark {
    #[inline]
    fn run_iter(&mut self, param: i32) {
        // SAFETY: resolved from `_library`, which is still loaded.
        unsafe { (self.run_iter)(param as c_int) }
    }
}

/// A benchmark resolved by [`load_benchmark`].
pub enum LoadedBenchmark {
    Registered(&'static BenchmarkEntry),
    Dynamic(DynamicBenchmark),
}

impl LoadedBenchmark {
    pub fn name(&self) -> &str {
        match self {
            LoadedBenchmark::Registered(entry) => entry.name,
            LoadedBenchmark::Dynamic(lib) => lib.path(),
        }
    }
}

impl Benchmark for LoadedBenchmark {
    #[inline]
    fn run_iter(&mut self, param: i32) {
        match self {
            LoadedBenchmark::Registered(entry) => (entry.func)(param),
            LoadedBenchmark::Dynamic(lib) => lib.run_iter(param),
        }
    }
}

fn looks_like_library(name: &str) -> bool {
    [".so", ".dylib", ".dll"].iter().any(|ext| name.ends_with(ext)) || name.contains(".so.")
}

/// Resolve `benchmark` to something runnable.
///
/// An existing path is loaded as a shared library. Otherwise the name is
/// looked up among the registered benchmarks, and finally, if it looks like
/// a library file name, handed to the platform loader.
pub fn load_benchmark(benchmark: &str) -> Result<LoadedBenchmark, BenchmarkError> {
    if Path::new(benchmark).exists() {
        return DynamicBenchmark::load(benchmark).map(LoadedBenchmark::Dynamic);
    }
    if let Some(entry) = find_benchmark(benchmark) {
        tracing::debug!(name = entry.name, module = entry.module_path, "registered benchmark");
        return Ok(LoadedBenchmark::Registered(entry));
    }
    if looks_like_library(benchmark) {
        return DynamicBenchmark::load(benchmark).map(LoadedBenchmark::Dynamic);
    }
    Err(BenchmarkError::NotFound(benchmark.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static LAST_PARAM: AtomicI32 = AtomicI32::new(0);

    #[crate::benchmark(name = "entry_test_probe")]
    fn probe(param: i32) {
        LAST_PARAM.store(param, Ordering::SeqCst);
    }

    #[test]
    fn should_find_registered_benchmark_by_name() {
        let entry = find_benchmark("entry_test_probe").unwrap();
        assert_eq!(entry.module_path, module_path!());
        assert!(list_benchmarks().contains(&"entry_test_probe"));
    }

    #[test]
    fn should_find_registered_benchmark_by_module_path() {
        let qualified = format!("{}::entry_test_probe", module_path!());
        assert!(find_benchmark(&qualified).is_some());
        assert!(find_benchmark("other::entry_test_probe").is_none());
    }

    #[test]
    fn should_pass_param_through_when_registered() {
        let mut bench = load_benchmark("entry_test_probe").unwrap();
        assert_eq!(bench.name(), "entry_test_probe");
        bench.run_iter(-42);
        assert_eq!(LAST_PARAM.load(Ordering::SeqCst), -42);
    }

    #[test]
    fn should_report_not_found_when_unknown() {
        let err = load_benchmark("no_such_benchmark").err().unwrap();
        assert!(matches!(err, BenchmarkError::NotFound(name) if name == "no_such_benchmark"));
    }

    #[test]
    fn should_report_load_error_when_file_is_not_a_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.so");
        std::fs::write(&path, b"not an object file").unwrap();
        let err = load_benchmark(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, BenchmarkError::Load { .. }));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn should_report_missing_entry_point_when_symbol_absent() {
        let err = load_benchmark("libm.so.6").err().unwrap();
        assert!(matches!(err, BenchmarkError::MissingEntryPoint { .. }));
    }

    #[test]
    fn should_run_closures_as_benchmarks() {
        let mut seen = Vec::new();
        {
            let mut bench = |p: i32| seen.push(p);
            bench.run_iter(1);
            bench.run_iter(2);
        }
        assert_eq!(seen, [1, 2]);
    }

    #[test]
    fn should_recognise_library_names() {
        assert!(looks_like_library("libbench.so"));
        assert!(looks_like_library("libm.so.6"));
        assert!(looks_like_library("bench.dylib"));
        assert!(!looks_like_library("fannkuch_redux"));
    }
}
