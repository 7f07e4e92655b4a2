//! Wallclock plus the CPU time-stamp counter.

use super::{CycleCounter, MonotonicClock, Wallclock};
use crate::error::BackendError;

/// Whether this platform provides a user-readable cycle counter.
pub const HAS_CYCLE_COUNTER: bool = cfg!(target_arch = "x86_64") || cfg!(target_arch = "aarch64");

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_cycles() -> u64 {
    // SAFETY: RDTSCP is available on every x86_64 CPU we run on and only
    // writes the processor id into `aux`.
    unsafe {
        let mut aux: u32 = 0;
        std::arch::x86_64::__rdtscp(&mut aux)
    }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_cycles() -> u64 {
    let cnt: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on all AArch64 implementations.
    unsafe {
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nostack, nomem));
    }
    cnt
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_cycles() -> u64 {
    0
}

/// `rdtscp` on x86_64, `cntvct_el0` on AArch64.
#[derive(Debug, Clone, Copy)]
pub struct TscCounter {
    clock: MonotonicClock,
}

impl TscCounter {
    pub fn new() -> Result<Self, BackendError> {
        if !HAS_CYCLE_COUNTER {
            return Err(BackendError::Unavailable {
                name: "tsc",
                reason: format!("no cycle counter on {}", std::env::consts::ARCH),
            });
        }
        Ok(Self {
            clock: MonotonicClock::new(),
        })
    }
}

impl Wallclock for TscCounter {
    #[inline]
    fn now(&mut self) -> Result<f64, BackendError> {
        self.clock.read()
    }
}

impl CycleCounter for TscCounter {
    #[inline]
    fn cycles(&mut self) -> Result<u64, BackendError> {
        Ok(read_cycles())
    }
}
