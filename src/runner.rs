//! The measurement loop.

use crate::backend::{Backend, Frame, Slot};
use crate::buffer::ResultMatrix;
use crate::config::RunConfig;
use crate::entry::Benchmark;
use crate::error::RunError;
use crate::report::{MultiReporter, Reporter};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    /// Measuring the given 0-based iteration.
    Measuring(usize),
    Teardown,
    Done,
    /// A fatal error ended the run; no results were produced.
    Aborted,
}

/// Runs one benchmark for a fixed number of iterations.
///
/// # Example
///
/// ```rust
/// use iteration_runner::{Backend, IterationRunner, MonotonicClock, RunConfig};
///
/// let config = RunConfig::new().benchmark("inline").iterations(3);
/// let backend = Backend::WallclockOnly(Box::new(MonotonicClock::new()));
/// let mut runner = IterationRunner::new(config, backend);
///
/// let mut work = |n: i32| {
///     std::hint::black_box((0..n).sum::<i32>());
/// };
/// let results = runner.run(&mut work).unwrap();
/// assert!(results.is_complete());
/// ```
pub struct IterationRunner {
    config: RunConfig,
    backend: Backend,
    reporter: Box<dyn Reporter>,
    phase: Phase,
}

impl IterationRunner {
    /// Create a runner with the reporters implied by `config`.
    pub fn new(config: RunConfig, backend: Backend) -> Self {
        let reporter = Box::new(MultiReporter::for_config(&config));
        Self {
            config,
            backend,
            reporter,
            phase: Phase::Init,
        }
    }

    /// Replace the reporter.
    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace reporters with a custom set.
    pub fn reporters(self, reporters: Vec<Box<dyn Reporter>>) -> Self {
        self.reporter(Box::new(MultiReporter::new(reporters)))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Initialise the backend, measure every iteration, tear down.
    ///
    /// Any error is fatal: the backend is shut down on a best-effort basis
    /// and the partially filled results are dropped.
    pub fn run(&mut self, bench: &mut dyn Benchmark) -> Result<ResultMatrix, RunError> {
        self.phase = Phase::Init;
        let layout = match self.backend.init() {
            Ok(layout) => layout,
            Err(e) => {
                self.phase = Phase::Aborted;
                return Err(e.into());
            }
        };
        let mut results = ResultMatrix::allocate(layout, self.config.iterations);
        tracing::debug!(
            backend = self.backend.variant(),
            iterations = results.iterations(),
            rows = results.row_count(),
            "result buffer allocated"
        );
        self.reporter.run_start(&self.config, results.layout());

        if let Err(e) = self.measure(bench, &mut results) {
            self.abort();
            return Err(e);
        }

        self.phase = Phase::Teardown;
        if let Err(e) = self.backend.shutdown() {
            self.phase = Phase::Aborted;
            return Err(e.into());
        }
        self.phase = Phase::Done;
        tracing::debug!("run complete");
        self.reporter.run_end(&results);
        Ok(results)
    }

    fn measure(
        &mut self,
        bench: &mut dyn Benchmark,
        results: &mut ResultMatrix,
    ) -> Result<(), RunError> {
        let total = results.iterations();
        let rows = results.row_count();
        let param = self.config.param;
        let mut frame = Frame::new();

        for iter in 0..total {
            self.phase = Phase::Measuring(iter);
            self.reporter.iteration_start(iter, total);

            self.backend.mark(Slot::Before, &mut frame)?;
            bench.run_iter(param);
            self.backend.mark(Slot::After, &mut frame)?;

            for row in 0..rows {
                let (metric, core) = results.row_key(row);
                let delta = self.backend.sample(&frame, metric, core)?.delta()?;
                results.record_row(row, iter, delta)?;
            }

            self.reporter.iteration_end(iter, total);
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.phase = Phase::Aborted;
        if let Err(e) = self.backend.shutdown() {
            tracing::warn!(error = %e, "backend teardown failed after fatal error");
        }
    }
}
