//! Scripted backends for exercising the measurement loop without hardware.
//!
//! Readings are supplied up front as `(before, after)` pairs, one per
//! iteration. Every backend call can be recorded into a shared [`CallLog`].

use crate::backend::{
    CycleCounter, MetricKind, PerfCounters, Reading, SnapshotCounters, Slot, Wallclock,
};
use crate::error::BackendError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Ordered record of backend and reporter calls, shareable across owners.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of calls named `call`.
    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

fn flatten<T: Copy>(pairs: Vec<(T, T)>) -> VecDeque<T> {
    pairs.into_iter().flat_map(|(a, b)| [a, b]).collect()
}

/// Single-core backend that replays scripted readings.
///
/// Usable as any of the three single-core capability sets. Each accessor
/// pops the next value of its own queue and fails with
/// [`BackendError::Exhausted`] once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedCounters {
    wallclock: VecDeque<f64>,
    cycles: VecDeque<u64>,
    aperf: VecDeque<u64>,
    mperf: VecDeque<u64>,
    reads: usize,
    log: Option<CallLog>,
}

impl ScriptedCounters {
    /// Wallclock readings as `(before, after)` per iteration.
    pub fn new(wallclock: Vec<(f64, f64)>) -> Self {
        Self {
            wallclock: flatten(wallclock),
            ..Self::default()
        }
    }

    /// Wallclock pairs `(i, i + delta)` for `iterations` iterations.
    pub fn constant_delta(iterations: usize, delta: f64) -> Self {
        Self::new((0..iterations).map(|i| (i as f64, i as f64 + delta)).collect())
    }

    pub fn cycles(mut self, pairs: Vec<(u64, u64)>) -> Self {
        self.cycles = flatten(pairs);
        self
    }

    pub fn aperf(mut self, pairs: Vec<(u64, u64)>) -> Self {
        self.aperf = flatten(pairs);
        self
    }

    pub fn mperf(mut self, pairs: Vec<(u64, u64)>) -> Self {
        self.mperf = flatten(pairs);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    fn next<T: Copy>(
        queue: &mut VecDeque<T>,
        reads: &mut usize,
        log: &Option<CallLog>,
        call: &'static str,
    ) -> Result<T, BackendError> {
        if let Some(log) = log {
            log.push(call);
        }
        let value = queue.pop_front().ok_or(BackendError::Exhausted(*reads))?;
        *reads += 1;
        Ok(value)
    }
}

impl Wallclock for ScriptedCounters {
    fn now(&mut self) -> Result<f64, BackendError> {
        Self::next(&mut self.wallclock, &mut self.reads, &self.log, "now")
    }
}

impl CycleCounter for ScriptedCounters {
    fn cycles(&mut self) -> Result<u64, BackendError> {
        Self::next(&mut self.cycles, &mut self.reads, &self.log, "cycles")
    }
}

impl PerfCounters for ScriptedCounters {
    fn aperf(&mut self) -> Result<u64, BackendError> {
        Self::next(&mut self.aperf, &mut self.reads, &self.log, "aperf")
    }

    fn mperf(&mut self) -> Result<u64, BackendError> {
        Self::next(&mut self.mperf, &mut self.reads, &self.log, "mperf")
    }
}

/// Multi-core snapshot backend that replays scripted readings.
///
/// Per-core counter scripts are indexed `[iteration][core]`. Counters that
/// were never scripted read as zero on both sides.
#[derive(Debug, Default)]
pub struct ScriptedSnapshot {
    num_cores: usize,
    wallclock: Vec<(f64, f64)>,
    counters: [Vec<Vec<(u64, u64)>>; 3],
    /// Iteration of the most recent `mark(Before)`.
    current: Option<usize>,
    initialised: bool,
    fail_init: bool,
    log: Option<CallLog>,
}

impl ScriptedSnapshot {
    pub fn new(num_cores: usize, wallclock: Vec<(f64, f64)>) -> Self {
        Self {
            num_cores,
            wallclock,
            ..Self::default()
        }
    }

    /// Script one per-core counter, indexed `[iteration][core]`.
    pub fn counter(mut self, metric: MetricKind, pairs: Vec<Vec<(u64, u64)>>) -> Self {
        if let Some(idx) = counter_index(metric) {
            self.counters[idx] = pairs;
        }
        self
    }

    /// Make `init` fail.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    fn record(&self, call: &'static str) {
        if let Some(log) = &self.log {
            log.push(call);
        }
    }
}

fn counter_index(metric: MetricKind) -> Option<usize> {
    MetricKind::COUNTERS.iter().position(|m| *m == metric)
}

fn pick<T>(slot: Slot, (before, after): (T, T)) -> T {
    match slot {
        Slot::Before => before,
        Slot::After => after,
    }
}

impl SnapshotCounters for ScriptedSnapshot {
    fn init(&mut self) -> Result<(), BackendError> {
        self.record("init");
        if self.fail_init {
            return Err(BackendError::Unavailable {
                name: "scripted",
                reason: "init failure requested".to_string(),
            });
        }
        self.initialised = true;
        Ok(())
    }

    fn num_cores(&self) -> usize {
        self.num_cores
    }

    fn mark(&mut self, slot: Slot) -> Result<(), BackendError> {
        self.record(match slot {
            Slot::Before => "mark_before",
            Slot::After => "mark_after",
        });
        if !self.initialised {
            return Err(BackendError::NotInitialised);
        }
        if slot == Slot::Before {
            let next = self.current.map_or(0, |i| i + 1);
            if next >= self.wallclock.len() {
                return Err(BackendError::Exhausted(next));
            }
            self.current = Some(next);
        }
        Ok(())
    }

    fn reading(
        &self,
        slot: Slot,
        core: usize,
        metric: MetricKind,
    ) -> Result<Reading, BackendError> {
        let iter = self.current.ok_or(BackendError::NotInitialised)?;
        if metric == MetricKind::Wallclock {
            return Ok(Reading::Seconds(pick(slot, self.wallclock[iter])));
        }
        if core >= self.num_cores {
            return Err(BackendError::CoreOutOfRange {
                core,
                num_cores: self.num_cores,
            });
        }
        let pair = counter_index(metric)
            .and_then(|idx| self.counters[idx].get(iter))
            .and_then(|cores| cores.get(core))
            .copied()
            .unwrap_or((0, 0));
        Ok(Reading::Count(pick(slot, pair)))
    }

    fn shutdown(&mut self) -> Result<(), BackendError> {
        self.record("shutdown");
        self.initialised = false;
        Ok(())
    }
}
