//! Pluggable reporters for the diagnostic stream.
//!
//! Reporters are called by the measurement loop outside the timed bracket:
//! `iteration_start` runs before the first "before" reading and
//! `iteration_end` after the deltas of that iteration are stored. Nothing a
//! reporter writes ever reaches the primary output.

use crate::buffer::{Layout, ResultMatrix};
use crate::config::RunConfig;
use std::io::Write;
use std::sync::Mutex;

/// Trait for run progress reporters.
pub trait Reporter: Send + Sync {
    /// Called once the backend is initialised and the buffer allocated.
    fn run_start(&self, _config: &RunConfig, _layout: &Layout) {}

    /// Called before iteration `iter` (0-based) of `total` is measured.
    fn iteration_start(&self, _iter: usize, _total: usize) {}

    /// Called after iteration `iter` has been measured and stored.
    fn iteration_end(&self, _iter: usize, _total: usize) {}

    /// Called after teardown of a completed run.
    fn run_end(&self, _results: &ResultMatrix) {}
}

/// Progress lines on stderr, enabled by the debug flag.
pub struct ConsoleReporter {
    tag: &'static str,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            tag: "iterations_runner.rs",
        }
    }

    /// Use a different `[tag]` prefix on progress lines.
    pub fn tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    fn progress_line(&self, iter: usize, total: usize) -> String {
        format!("[{}] iteration {}/{}", self.tag, iter + 1, total)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn iteration_start(&self, iter: usize, total: usize) {
        eprintln!("{}", self.progress_line(iter, total));
    }
}

/// Marker lines for the executor's instrumentation parser.
///
/// Writes `@@@ END_IN_PROC_ITER: {iter}` after every iteration and flushes,
/// so the executor can line up its own out-of-band samples.
pub struct InstrumentationReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl InstrumentationReporter {
    /// Write markers to stderr.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for InstrumentationReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for InstrumentationReporter {
    fn iteration_end(&self, iter: usize, _total: usize) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "@@@ END_IN_PROC_ITER: {iter}").and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write instrumentation marker");
        }
    }
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    /// Reporters implied by the debug and instrumentation settings.
    pub fn for_config(config: &RunConfig) -> Self {
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.debug {
            reporters.push(Box::new(ConsoleReporter::new()));
        }
        if config.instrumentation.is_some() {
            reporters.push(Box::new(InstrumentationReporter::new()));
        }
        Self::new(reporters)
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for MultiReporter {
    fn run_start(&self, config: &RunConfig, layout: &Layout) {
        for r in &self.reporters {
            r.run_start(config, layout);
        }
    }

    fn iteration_start(&self, iter: usize, total: usize) {
        for r in &self.reporters {
            r.iteration_start(iter, total);
        }
    }

    fn iteration_end(&self, iter: usize, total: usize) {
        for r in &self.reporters {
            r.iteration_end(iter, total);
        }
    }

    fn run_end(&self, results: &ResultMatrix) {
        for r in &self.reporters {
            r.run_end(results);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Instrumentation;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn should_number_progress_lines_from_one() {
        let reporter = ConsoleReporter::new();
        assert_eq!(
            reporter.progress_line(0, 3),
            "[iterations_runner.rs] iteration 1/3"
        );
        assert_eq!(
            reporter.tag("demo").progress_line(2, 3),
            "[demo] iteration 3/3"
        );
    }

    #[test]
    fn should_write_marker_per_iteration_when_instrumented() {
        let buf = SharedBuf::default();
        let reporter = InstrumentationReporter::with_writer(Box::new(buf.clone()));
        reporter.iteration_start(0, 2);
        reporter.iteration_end(0, 2);
        reporter.iteration_end(1, 2);
        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "@@@ END_IN_PROC_ITER: 0\n@@@ END_IN_PROC_ITER: 1\n");
    }

    #[test]
    fn should_pick_reporters_from_config() {
        assert!(MultiReporter::for_config(&RunConfig::new()).is_empty());

        let cfg = RunConfig::new().debug(true).instrumentation(Instrumentation {
            dir: "/tmp/instr".into(),
            key: "dummy:rust:default".to_string(),
            key_pexec_index: 0,
        });
        assert_eq!(MultiReporter::for_config(&cfg).len(), 2);
    }
}
