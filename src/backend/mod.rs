//! Measurement backends.
//!
//! The runner never reads a clock or counter itself. It goes through one of
//! four capability sets, from weakest to strongest:
//!
//! | Variant                      | Readings                                  |
//! |------------------------------|-------------------------------------------|
//! | `WallclockOnly`              | `now()`                                   |
//! | `WallclockAndCycles`         | `now()`, `cycles()`                       |
//! | `WallclockCyclesAperfMperf`  | `now()`, `cycles()`, `aperf()`, `mperf()` |
//! | `MultiCoreSnapshot`          | `init`/`mark`/`reading`/`shutdown`        |
//!
//! A [`Backend`] is chosen once at startup and handed to the
//! [`IterationRunner`](crate::IterationRunner). Reading a value must not
//! allocate: implementations keep whatever state they need from `init`.

mod clock;
mod kruntime;
#[cfg(target_os = "linux")]
mod msr;
mod tsc;

pub use clock::MonotonicClock;
pub use kruntime::Kruntime;
#[cfg(target_os = "linux")]
pub use msr::MsrCounters;
pub use tsc::TscCounter;

use crate::buffer::Layout;
use crate::error::BackendError;
use crate::sample::Sample;
use std::fmt;
use std::path::Path;

/// One measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    Wallclock,
    CoreCycles,
    Aperf,
    Mperf,
}

impl MetricKind {
    /// Canonical order used for storage and output.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Wallclock,
        MetricKind::CoreCycles,
        MetricKind::Aperf,
        MetricKind::Mperf,
    ];

    /// Per-core hardware counters, in canonical order.
    pub const COUNTERS: [MetricKind; 3] =
        [MetricKind::CoreCycles, MetricKind::Aperf, MetricKind::Mperf];

    /// Key used in keyed output.
    pub fn key(self) -> &'static str {
        match self {
            MetricKind::Wallclock => "wallclock_times",
            MetricKind::CoreCycles => "core_cycle_counts",
            MetricKind::Aperf => "aperf_counts",
            MetricKind::Mperf => "mperf_counts",
        }
    }

    /// Short name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Wallclock => "wallclock",
            MetricKind::CoreCycles => "core_cycles",
            MetricKind::Aperf => "aperf",
            MetricKind::Mperf => "mperf",
        }
    }

    fn index(self) -> usize {
        match self {
            MetricKind::Wallclock => 0,
            MetricKind::CoreCycles => 1,
            MetricKind::Aperf => 2,
            MetricKind::Mperf => 3,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of the timed region a reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Before,
    After,
}

impl Slot {
    /// The `0`/`1` index used by native measurement libraries.
    pub fn index(self) -> usize {
        match self {
            Slot::Before => 0,
            Slot::After => 1,
        }
    }
}

/// A raw backend value.
///
/// Counters stay integral so that comparisons near `u64::MAX` are exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Monotonic clock value in seconds.
    Seconds(f64),
    /// Hardware counter value.
    Count(u64),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Seconds(s) => write!(f, "{s}"),
            Reading::Count(c) => write!(f, "{c}"),
        }
    }
}

/// A monotonic wallclock.
pub trait Wallclock {
    /// Current time in seconds. Never decreases between two calls on the
    /// same thread.
    fn now(&mut self) -> Result<f64, BackendError>;
}

/// A wallclock plus a core cycle counter.
pub trait CycleCounter: Wallclock {
    fn cycles(&mut self) -> Result<u64, BackendError>;
}

/// A wallclock, a cycle counter and the APERF/MPERF pair.
pub trait PerfCounters: CycleCounter {
    fn aperf(&mut self) -> Result<u64, BackendError>;
    fn mperf(&mut self) -> Result<u64, BackendError>;
}

/// A stateful backend that snapshots every core's counters at once.
///
/// `mark(Before)` and `mark(After)` bracket one benchmark call; readings are
/// retrieved afterwards with [`reading`](SnapshotCounters::reading).
/// The wallclock is not per-core, so its `core` argument is ignored.
pub trait SnapshotCounters {
    fn init(&mut self) -> Result<(), BackendError>;

    /// Number of cores with per-core readings. Valid after `init`.
    fn num_cores(&self) -> usize;

    fn mark(&mut self, slot: Slot) -> Result<(), BackendError>;

    fn reading(&self, slot: Slot, core: usize, metric: MetricKind)
        -> Result<Reading, BackendError>;

    fn shutdown(&mut self) -> Result<(), BackendError>;
}

/// Readings kept by the runner for single-core backends, indexed by
/// `[slot][metric]`. Lives on the stack for the whole run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    readings: [[Reading; 4]; 2],
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self {
            readings: [[Reading::Count(0); 4]; 2],
        }
    }

    fn set(&mut self, slot: Slot, metric: MetricKind, reading: Reading) {
        self.readings[slot.index()][metric.index()] = reading;
    }

    fn get(&self, slot: Slot, metric: MetricKind) -> Reading {
        self.readings[slot.index()][metric.index()]
    }
}

/// The active capability set.
pub enum Backend {
    WallclockOnly(Box<dyn Wallclock>),
    WallclockAndCycles(Box<dyn CycleCounter>),
    WallclockCyclesAperfMperf(Box<dyn PerfCounters>),
    MultiCoreSnapshot(Box<dyn SnapshotCounters>),
}

impl Backend {
    /// Human-readable variant name.
    pub fn variant(&self) -> &'static str {
        match self {
            Backend::WallclockOnly(_) => "wallclock-only",
            Backend::WallclockAndCycles(_) => "wallclock-and-cycles",
            Backend::WallclockCyclesAperfMperf(_) => "wallclock-cycles-aperf-mperf",
            Backend::MultiCoreSnapshot(_) => "multi-core-snapshot",
        }
    }

    /// Run lifecycle initialisation (if the variant has one) and describe
    /// the shape of the results this backend produces.
    pub fn init(&mut self) -> Result<Layout, BackendError> {
        let layout = match self {
            Backend::WallclockOnly(_) => Layout::single_core(&[MetricKind::Wallclock]),
            Backend::WallclockAndCycles(_) => {
                Layout::single_core(&[MetricKind::Wallclock, MetricKind::CoreCycles])
            }
            Backend::WallclockCyclesAperfMperf(_) => Layout::single_core(&MetricKind::ALL),
            Backend::MultiCoreSnapshot(snap) => {
                snap.init()?;
                Layout::multi_core(snap.num_cores())
            }
        };
        Ok(layout)
    }

    /// Lifecycle teardown, for variants that have one.
    pub fn shutdown(&mut self) -> Result<(), BackendError> {
        match self {
            Backend::MultiCoreSnapshot(snap) => snap.shutdown(),
            _ => Ok(()),
        }
    }

    /// Take every reading for one side of the timed region.
    ///
    /// The wallclock is read innermost: last before the benchmark, first
    /// after it. APERF and MPERF keep the same relative order on both sides.
    #[inline]
    pub(crate) fn mark(&mut self, slot: Slot, frame: &mut Frame) -> Result<(), BackendError> {
        match (self, slot) {
            (Backend::WallclockOnly(b), _) => {
                frame.set(slot, MetricKind::Wallclock, Reading::Seconds(b.now()?));
            }
            (Backend::WallclockAndCycles(b), Slot::Before) => {
                frame.set(slot, MetricKind::CoreCycles, Reading::Count(b.cycles()?));
                frame.set(slot, MetricKind::Wallclock, Reading::Seconds(b.now()?));
            }
            (Backend::WallclockAndCycles(b), Slot::After) => {
                frame.set(slot, MetricKind::Wallclock, Reading::Seconds(b.now()?));
                frame.set(slot, MetricKind::CoreCycles, Reading::Count(b.cycles()?));
            }
            (Backend::WallclockCyclesAperfMperf(b), Slot::Before) => {
                frame.set(slot, MetricKind::Aperf, Reading::Count(b.aperf()?));
                frame.set(slot, MetricKind::Mperf, Reading::Count(b.mperf()?));
                frame.set(slot, MetricKind::CoreCycles, Reading::Count(b.cycles()?));
                frame.set(slot, MetricKind::Wallclock, Reading::Seconds(b.now()?));
            }
            (Backend::WallclockCyclesAperfMperf(b), Slot::After) => {
                frame.set(slot, MetricKind::Wallclock, Reading::Seconds(b.now()?));
                frame.set(slot, MetricKind::CoreCycles, Reading::Count(b.cycles()?));
                frame.set(slot, MetricKind::Aperf, Reading::Count(b.aperf()?));
                frame.set(slot, MetricKind::Mperf, Reading::Count(b.mperf()?));
            }
            (Backend::MultiCoreSnapshot(snap), _) => snap.mark(slot)?,
        }
        Ok(())
    }

    /// Pair up the before/after readings of one metric.
    #[inline]
    pub(crate) fn sample(
        &self,
        frame: &Frame,
        metric: MetricKind,
        core: Option<usize>,
    ) -> Result<Sample, BackendError> {
        let (start, stop) = match self {
            Backend::MultiCoreSnapshot(snap) => {
                let core_idx = core.unwrap_or(0);
                (
                    snap.reading(Slot::Before, core_idx, metric)?,
                    snap.reading(Slot::After, core_idx, metric)?,
                )
            }
            _ => (frame.get(Slot::Before, metric), frame.get(Slot::After, metric)),
        };
        Ok(Sample {
            metric,
            core,
            start,
            stop,
        })
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.variant()).finish()
    }
}

/// Backend selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendChoice {
    /// Monotonic clock only.
    #[default]
    Wallclock,
    /// Monotonic clock plus the time-stamp counter.
    Tsc,
    /// Monotonic clock plus fixed counter 1, APERF and MPERF of the
    /// current core, read through the MSR device.
    Msr,
    /// Per-core snapshots through the native `libkruntime` library.
    Kruntime,
}

impl BackendChoice {
    /// Resolve this choice to a concrete backend.
    pub fn open(self, kruntime_path: &Path) -> Result<Backend, BackendError> {
        let backend = match self {
            BackendChoice::Wallclock => Backend::WallclockOnly(Box::new(MonotonicClock::new())),
            BackendChoice::Tsc => Backend::WallclockAndCycles(Box::new(TscCounter::new()?)),
            BackendChoice::Msr => open_msr()?,
            BackendChoice::Kruntime => {
                Backend::MultiCoreSnapshot(Box::new(Kruntime::load(kruntime_path)?))
            }
        };
        tracing::debug!(choice = ?self, variant = backend.variant(), "backend opened");
        Ok(backend)
    }
}

#[cfg(target_os = "linux")]
fn open_msr() -> Result<Backend, BackendError> {
    Ok(Backend::WallclockCyclesAperfMperf(Box::new(
        MsrCounters::open_current()?,
    )))
}

#[cfg(not(target_os = "linux"))]
fn open_msr() -> Result<Backend, BackendError> {
    Err(BackendError::Unavailable {
        name: "msr",
        reason: "MSR device nodes are only supported on Linux".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, ScriptedCounters};

    #[test]
    fn should_use_fixed_output_keys() {
        let keys: Vec<_> = MetricKind::ALL.iter().map(|m| m.key()).collect();
        assert_eq!(
            keys,
            ["wallclock_times", "core_cycle_counts", "aperf_counts", "mperf_counts"]
        );
    }

    #[test]
    fn should_read_wallclock_innermost_when_bracketing() {
        let log = CallLog::new();
        let counters = ScriptedCounters::new(vec![(0.0, 1.0)])
            .cycles(vec![(0, 1)])
            .aperf(vec![(0, 1)])
            .mperf(vec![(0, 1)])
            .with_log(log.clone());
        let mut backend = Backend::WallclockCyclesAperfMperf(Box::new(counters));
        let mut frame = Frame::new();

        backend.mark(Slot::Before, &mut frame).unwrap();
        backend.mark(Slot::After, &mut frame).unwrap();

        assert_eq!(
            log.calls(),
            ["aperf", "mperf", "cycles", "now", "now", "cycles", "aperf", "mperf"]
        );
    }

    #[test]
    fn should_describe_flat_layout_when_single_core() {
        let mut backend = Backend::WallclockAndCycles(Box::new(
            ScriptedCounters::new(vec![]).cycles(vec![]),
        ));
        let layout = backend.init().unwrap();
        assert_eq!(layout.flat_metrics(), &[MetricKind::Wallclock, MetricKind::CoreCycles]);
        assert!(layout.per_core_metrics().is_empty());
    }

    #[test]
    fn should_report_unavailable_when_msr_off_linux() {
        if cfg!(target_os = "linux") {
            return;
        }
        let err = BackendChoice::Msr.open(Path::new("unused")).unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }
}
