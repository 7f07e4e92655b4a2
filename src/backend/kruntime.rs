//! Binding to the native `libkruntime` measurement library.
//!
//! The library snapshots wallclock and per-core counters for every core at
//! once. Its C interface is:
//!
//! ```c
//! void     krun_init(void);
//! void     krun_done(void);
//! void     krun_measure(int mdata_idx);
//! int      krun_get_num_cores(void);
//! double   krun_get_wallclock(int mdata_idx);
//! uint64_t krun_get_core_cycles(int mdata_idx, int core);
//! uint64_t krun_get_aperf(int mdata_idx, int core);
//! uint64_t krun_get_mperf(int mdata_idx, int core);
//! ```

use super::{MetricKind, Reading, SnapshotCounters, Slot};
use crate::error::BackendError;
use libloading::Library;
use std::os::raw::c_int;
use std::path::Path;

type VoidFn = unsafe extern "C" fn();
type MeasureFn = unsafe extern "C" fn(c_int);
type NumCoresFn = unsafe extern "C" fn() -> c_int;
type WallclockFn = unsafe extern "C" fn(c_int) -> f64;
type CounterFn = unsafe extern "C" fn(c_int, c_int) -> u64;

/// `libkruntime` loaded at runtime.
///
/// The library handle is kept alive for as long as the resolved function
/// pointers are.
pub struct Kruntime {
    path: String,
    init: VoidFn,
    done: VoidFn,
    measure: MeasureFn,
    get_num_cores: NumCoresFn,
    get_wallclock: WallclockFn,
    get_core_cycles: CounterFn,
    get_aperf: CounterFn,
    get_mperf: CounterFn,
    num_cores: usize,
    initialised: bool,
    _library: Library,
}

impl Kruntime {
    /// Load the library and resolve every symbol up front.
    ///
    /// Nothing is called until [`SnapshotCounters::init`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path_str = path.as_ref().display().to_string();

        // SAFETY: loading runs the library's initialisers; libkruntime has
        // none beyond libc's.
        let library = unsafe {
            Library::new(path.as_ref()).map_err(|e| BackendError::Library {
                path: path_str.clone(),
                reason: e.to_string(),
            })?
        };

        // SAFETY: every symbol is resolved with the signature from
        // libkruntime.h.
        unsafe {
            Ok(Self {
                init: resolve(&library, &path_str, "krun_init")?,
                done: resolve(&library, &path_str, "krun_done")?,
                measure: resolve(&library, &path_str, "krun_measure")?,
                get_num_cores: resolve(&library, &path_str, "krun_get_num_cores")?,
                get_wallclock: resolve(&library, &path_str, "krun_get_wallclock")?,
                get_core_cycles: resolve(&library, &path_str, "krun_get_core_cycles")?,
                get_aperf: resolve(&library, &path_str, "krun_get_aperf")?,
                get_mperf: resolve(&library, &path_str, "krun_get_mperf")?,
                path: path_str,
                num_cores: 0,
                initialised: false,
                _library: library,
            })
        }
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn check_core(&self, core: usize) -> Result<c_int, BackendError> {
        if core >= self.num_cores {
            return Err(BackendError::CoreOutOfRange {
                core,
                num_cores: self.num_cores,
            });
        }
        Ok(core as c_int)
    }
}

/// Resolve `symbol` and copy the function pointer out of the library.
///
/// # Safety
///
/// `T` must match the symbol's real signature.
unsafe fn resolve<T: Copy>(
    library: &Library,
    path: &str,
    symbol: &'static str,
) -> Result<T, BackendError> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| BackendError::MissingSymbol {
            path: path.to_string(),
            symbol,
        })
}

impl SnapshotCounters for Kruntime {
    fn init(&mut self) -> Result<(), BackendError> {
        // SAFETY: resolved from the loaded library, which outlives `self`.
        let cores = unsafe {
            (self.init)();
            (self.get_num_cores)()
        };
        if cores < 0 {
            return Err(BackendError::InvalidCoreCount(cores as i64));
        }
        self.num_cores = cores as usize;
        self.initialised = true;
        tracing::debug!(path = %self.path, num_cores = self.num_cores, "libkruntime initialised");
        Ok(())
    }

    fn num_cores(&self) -> usize {
        self.num_cores
    }

    #[inline]
    fn mark(&mut self, slot: Slot) -> Result<(), BackendError> {
        if !self.initialised {
            return Err(BackendError::NotInitialised);
        }
        // SAFETY: see `init`.
        unsafe { (self.measure)(slot.index() as c_int) };
        Ok(())
    }

    #[inline]
    fn reading(
        &self,
        slot: Slot,
        core: usize,
        metric: MetricKind,
    ) -> Result<Reading, BackendError> {
        if !self.initialised {
            return Err(BackendError::NotInitialised);
        }
        let idx = slot.index() as c_int;
        // SAFETY: see `init`; `core` is bounds-checked before use.
        let reading = unsafe {
            match metric {
                MetricKind::Wallclock => Reading::Seconds((self.get_wallclock)(idx)),
                MetricKind::CoreCycles => {
                    Reading::Count((self.get_core_cycles)(idx, self.check_core(core)?))
                }
                MetricKind::Aperf => Reading::Count((self.get_aperf)(idx, self.check_core(core)?)),
                MetricKind::Mperf => Reading::Count((self.get_mperf)(idx, self.check_core(core)?)),
            }
        };
        Ok(reading)
    }

    fn shutdown(&mut self) -> Result<(), BackendError> {
        if !self.initialised {
            return Ok(());
        }
        // SAFETY: see `init`.
        unsafe { (self.done)() };
        self.initialised = false;
        tracing::debug!(path = %self.path, "libkruntime shut down");
        Ok(())
    }
}
