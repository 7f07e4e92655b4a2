//! Per-core counters read through the Linux MSR device.
//!
//! Uses fixed-function counter 1 (`CPU_CLK_UNHALTED.CORE`) for core cycles
//! plus `IA32_APERF` and `IA32_MPERF`. The `rmsr` node (an msr driver variant
//! without the capability check) is preferred over the stock `msr` node.
//! The device is opened once and held for the whole run; every read is a
//! positioned 8-byte `pread` into a stack buffer.

use super::{CycleCounter, MonotonicClock, PerfCounters, Wallclock};
use crate::error::BackendError;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;

const MSR_IA32_FIXED_CTR_CTRL: u64 = 0x38d;
const MSR_IA32_PERF_FIXED_CTR1: u64 = 0x30a;
const IA32_MPERF: u64 = 0xe7;
const IA32_APERF: u64 = 0xe8;

// Fixed counter 1 enable bits in IA32_FIXED_CTR_CTRL: ring 0, higher rings,
// any thread on the core.
const EN1_OS: u64 = 1 << 4;
const EN1_USR: u64 = 1 << 5;
const EN1_ANYTHR: u64 = 1 << 6;

/// Fixed counter 1, APERF and MPERF of a single core.
#[derive(Debug)]
pub struct MsrCounters {
    clock: MonotonicClock,
    node: File,
    core: usize,
    cycle_mask: u64,
}

impl MsrCounters {
    /// Open the counters of the core this process is currently running on.
    ///
    /// The process is expected to be pinned by its executor; a migration
    /// mid-run shows up as a monotonicity failure.
    pub fn open_current() -> Result<Self, BackendError> {
        // SAFETY: sched_getcpu has no preconditions.
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            return Err(BackendError::Io {
                op: "sched_getcpu",
                source: std::io::Error::last_os_error(),
            });
        }
        Self::open(cpu as usize)
    }

    /// Open, enable and reset the counters of `core`.
    pub fn open(core: usize) -> Result<Self, BackendError> {
        let width = fixed_counter_width()?;
        let node = open_node(core)?;
        let counters = Self {
            clock: MonotonicClock::new(),
            node,
            core,
            cycle_mask: counter_mask(width),
        };

        let ctrl = counters.read_msr(MSR_IA32_FIXED_CTR_CTRL)?;
        counters.write_msr(MSR_IA32_FIXED_CTR_CTRL, ctrl | EN1_OS | EN1_USR | EN1_ANYTHR)?;
        counters.write_msr(MSR_IA32_PERF_FIXED_CTR1, 0)?;
        counters.write_msr(IA32_MPERF, 0)?;
        counters.write_msr(IA32_APERF, 0)?;

        tracing::debug!(core, width, "msr counters enabled");
        Ok(counters)
    }

    /// Core these counters belong to.
    pub fn core(&self) -> usize {
        self.core
    }

    #[inline]
    fn read_msr(&self, addr: u64) -> Result<u64, BackendError> {
        let mut buf = [0u8; 8];
        self.node
            .read_exact_at(&mut buf, addr)
            .map_err(|source| BackendError::Io {
                op: "msr read",
                source,
            })?;
        Ok(u64::from_ne_bytes(buf))
    }

    fn write_msr(&self, addr: u64, value: u64) -> Result<(), BackendError> {
        self.node
            .write_all_at(&value.to_ne_bytes(), addr)
            .map_err(|source| BackendError::Io {
                op: "msr write",
                source,
            })
    }
}

fn open_node(core: usize) -> Result<File, BackendError> {
    let rmsr = format!("/dev/cpu/{core}/rmsr");
    let msr = format!("/dev/cpu/{core}/msr");
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(&rmsr)
        .or_else(|_| OpenOptions::new().read(true).write(true).open(&msr))
        .map_err(|source| BackendError::Io {
            op: "open msr device",
            source,
        })
}

fn counter_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Width in bits of the fixed-function counters, from CPUID leaf 0xA.
#[cfg(target_arch = "x86_64")]
fn fixed_counter_width() -> Result<u32, BackendError> {
    // SAFETY: CPUID is available on every x86_64 CPU. Newer toolchains
    // treat the intrinsic as safe.
    #[allow(unused_unsafe)]
    let leaf = unsafe { std::arch::x86_64::__cpuid(0xa) };
    let arch_version = leaf.eax & 0xff;
    let num_fixed = leaf.edx & 0x1f;
    let width = (leaf.edx & 0x1fe0) >> 5;

    // Fixed-function counters appeared in architectural PMU version 2.
    if arch_version < 2 {
        return Err(BackendError::Unavailable {
            name: "msr",
            reason: format!("architectural PMU version >= 2 required, got {arch_version}"),
        });
    }
    if num_fixed < 2 {
        return Err(BackendError::Unavailable {
            name: "msr",
            reason: format!("too few fixed-function counters: {num_fixed}"),
        });
    }
    if !(1..=64).contains(&width) {
        return Err(BackendError::Unavailable {
            name: "msr",
            reason: format!("implausible fixed-function counter width: {width}"),
        });
    }
    Ok(width)
}

#[cfg(not(target_arch = "x86_64"))]
fn fixed_counter_width() -> Result<u32, BackendError> {
    Err(BackendError::Unavailable {
        name: "msr",
        reason: "fixed-function counters are x86_64 only".to_string(),
    })
}

impl Wallclock for MsrCounters {
    #[inline]
    fn now(&mut self) -> Result<f64, BackendError> {
        self.clock.read()
    }
}

impl CycleCounter for MsrCounters {
    #[inline]
    fn cycles(&mut self) -> Result<u64, BackendError> {
        Ok(self.read_msr(MSR_IA32_PERF_FIXED_CTR1)? & self.cycle_mask)
    }
}

impl PerfCounters for MsrCounters {
    #[inline]
    fn aperf(&mut self) -> Result<u64, BackendError> {
        self.read_msr(IA32_APERF)
    }

    #[inline]
    fn mperf(&mut self) -> Result<u64, BackendError> {
        self.read_msr(IA32_MPERF)
    }
}
