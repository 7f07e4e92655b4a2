//! Demonstration benchmarks.
//!
//! Each benchmark is registered with `#[benchmark]` for the `demo-runner`
//! binary. The crate also builds as a `cdylib` whose exported `run_iter`
//! runs `fannkuch_redux`, for the shared-library loading path:
//!
//! ```text
//! iterations-runner target/release/libiteration_runner_demo.so 5 10 1
//! ```

use iteration_runner::benchmark;
use std::hint::black_box;
use std::os::raw::c_int;
use std::time::Duration;

const DUMMY_DELAY: Duration = Duration::from_secs(1);

/// Sleeps for one second per iteration.
#[benchmark]
pub fn dummy(_param: i32) {
    std::thread::sleep(DUMMY_DELAY);
}

#[benchmark]
pub fn fannkuch_redux(param: i32) {
    for _ in 0..param {
        let mut state = Fannkuch::new();
        state.permute();
        assert_eq!(
            state.checksum, EXPECT_CKSUM,
            "bad checksum: {} vs {}",
            state.checksum, EXPECT_CKSUM
        );
        black_box(state.maxflips);
    }
}

/// Busy loop of `param` additions.
#[benchmark]
pub fn spin(param: i32) {
    for i in 0..param {
        black_box(i);
    }
}

/// Shared-library entry point.
#[no_mangle]
pub extern "C" fn run_iter(param: c_int) {
    fannkuch_redux(param);
}

const MAX_N: usize = 8;
const EXPECT_CKSUM: i32 = 1616;

struct Fannkuch {
    s: [usize; MAX_N],
    t: [usize; MAX_N],
    maxflips: i32,
    odd: bool,
    checksum: i32,
}

impl Fannkuch {
    fn new() -> Self {
        Self {
            s: std::array::from_fn(|i| i),
            t: [0; MAX_N],
            maxflips: 0,
            odd: false,
            checksum: 0,
        }
    }

    fn flip(&mut self) -> i32 {
        self.t = self.s;
        let mut flips = 1;
        loop {
            let k = self.t[0];
            self.t[..=k].reverse();
            flips += 1;
            if self.t[self.t[0]] == 0 {
                return flips;
            }
        }
    }

    fn rotate(&mut self, n: usize) {
        self.s[..=n].rotate_left(1);
    }

    // Tompkins-Paige iterative permutation generation.
    fn permute(&mut self) {
        let mut c = [0usize; MAX_N];
        let mut i = 0;

        while i < MAX_N {
            self.rotate(i);
            if c[i] >= i {
                c[i] = 0;
                i += 1;
                continue;
            }

            c[i] += 1;
            i = 1;
            self.odd = !self.odd;
            if self.s[0] != 0 {
                let f = if self.s[self.s[0]] != 0 { self.flip() } else { 1 };
                self.maxflips = self.maxflips.max(f);
                self.checksum += if self.odd { -f } else { f };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_reference_checksum() {
        let mut state = Fannkuch::new();
        state.permute();
        assert_eq!(state.checksum, EXPECT_CKSUM);
        assert_eq!(state.maxflips, 22);
    }

    #[test]
    fn should_register_demo_benchmarks() {
        let names = iteration_runner::list_benchmarks();
        for name in ["dummy", "fannkuch_redux", "spin"] {
            assert!(names.contains(&name), "{name} not registered");
        }
    }

    #[test]
    fn should_run_registered_benchmark_through_runner() {
        use iteration_runner::{Backend, IterationRunner, MonotonicClock, RunConfig};

        let mut bench = iteration_runner::load_benchmark("fannkuch_redux").unwrap();
        let config = RunConfig::new().benchmark("fannkuch_redux").iterations(2).param(1);
        let backend = Backend::WallclockOnly(Box::new(MonotonicClock::new()));
        let results = IterationRunner::new(config, backend).run(&mut bench).unwrap();
        assert!(results.is_complete());
    }
}
