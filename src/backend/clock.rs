//! Monotonic wallclock.
//!
//! The clock id is fixed at build time: Linux uses `CLOCK_MONOTONIC_RAW`,
//! which is not slewed by NTP; other Unix systems use `CLOCK_MONOTONIC`.

use super::Wallclock;
use crate::error::BackendError;

#[cfg(target_os = "linux")]
const CLOCK_ID: libc::clockid_t = libc::CLOCK_MONOTONIC_RAW;

#[cfg(all(unix, not(target_os = "linux")))]
const CLOCK_ID: libc::clockid_t = libc::CLOCK_MONOTONIC;

/// Monotonic clock reporting seconds as `f64`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    #[cfg(not(unix))]
    origin: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(unix))]
            origin: std::time::Instant::now(),
        }
    }

    /// Read the clock.
    #[cfg(unix)]
    #[inline(always)]
    pub fn read(&self) -> Result<f64, BackendError> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(CLOCK_ID, &mut ts) };
        if rc != 0 {
            return Err(BackendError::Io {
                op: "clock_gettime",
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(ts.tv_sec as f64 + ts.tv_nsec as f64 * 1e-9)
    }

    #[cfg(not(unix))]
    #[inline(always)]
    pub fn read(&self) -> Result<f64, BackendError> {
        Ok(self.origin.elapsed().as_secs_f64())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallclock for MonotonicClock {
    #[inline]
    fn now(&mut self) -> Result<f64, BackendError> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_never_decrease_when_read_repeatedly() {
        let mut clock = MonotonicClock::new();
        let mut last = clock.now().unwrap();
        for _ in 0..10_000 {
            let now = clock.now().unwrap();
            assert!(now >= last, "clock went backwards: {last} -> {now}");
            last = now;
        }
    }

    #[test]
    fn should_measure_sleep_when_bracketing() {
        let mut clock = MonotonicClock::new();
        let start = clock.now().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let stop = clock.now().unwrap();
        assert!(stop - start >= 0.009);
        assert!(stop - start < 1.0);
    }
}
