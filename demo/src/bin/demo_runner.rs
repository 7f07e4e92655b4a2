//! Runner binary with the demo benchmarks compiled in.
//!
//! ```text
//! demo-runner fannkuch_redux 10 5 1
//! demo-runner --list
//! ```

use iteration_runner_demo as _;

iteration_runner::runner_main!();
