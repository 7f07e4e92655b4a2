//! Property tests for the measurement protocol against scripted backends.

use iteration_runner::testing::{ScriptedCounters, ScriptedSnapshot};
use iteration_runner::{
    render, Backend, IterationRunner, MeasureError, MetricKind, OutputShape, RunConfig, RunError,
    Series,
};
use proptest::prelude::*;

fn config(iterations: usize) -> RunConfig {
    RunConfig::new().benchmark("scripted").iterations(iterations)
}

fn noop() -> impl FnMut(i32) {
    |_| {}
}

proptest! {
    #[test]
    fn aborts_iff_some_wallclock_pair_is_inverted(
        pairs in prop::collection::vec((0u32..1000, 0u32..1000), 1..20)
    ) {
        let inverted = pairs.iter().any(|(start, stop)| start > stop);
        let scripted = pairs.iter().map(|&(a, b)| (a as f64, b as f64)).collect();
        let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::new(scripted)));

        let outcome = IterationRunner::new(config(pairs.len()), backend).run(&mut noop());

        match outcome {
            Ok(results) => {
                prop_assert!(!inverted);
                match results.series(MetricKind::Wallclock) {
                    Some(Series::Flat(deltas)) => {
                        prop_assert!(deltas.iter().all(|d| *d >= 0.0));
                    }
                    other => prop_assert!(false, "unexpected series {:?}", other),
                }
            }
            Err(e) => {
                prop_assert!(inverted);
                let is_non_monotonic = matches!(e, RunError::Measure(MeasureError::NonMonotonic { .. }));
                prop_assert!(is_non_monotonic);
            }
        }
    }

    #[test]
    fn aborts_iff_some_counter_pair_is_inverted(
        cycles in prop::collection::vec((any::<u64>(), any::<u64>()), 1..10)
    ) {
        let n = cycles.len();
        // Large counter deltas may not fit an f64 exactly; keep them small.
        let cycles: Vec<(u64, u64)> = cycles
            .into_iter()
            .map(|(a, b)| (a, if b > a { a + (b - a) % (1 << 40) } else { b }))
            .collect();
        let inverted = cycles.iter().any(|(start, stop)| start > stop);
        let wallclock = (0..n).map(|i| (i as f64, i as f64 + 1.0)).collect();
        let backend = Backend::WallclockAndCycles(Box::new(
            ScriptedCounters::new(wallclock).cycles(cycles),
        ));

        let outcome = IterationRunner::new(config(n), backend).run(&mut noop());
        prop_assert_eq!(outcome.is_err(), inverted);
    }

    #[test]
    fn emits_constant_deltas_for_constant_backend(n in 1usize..50, k in 0u32..1000) {
        let delta = k as f64 / 8.0;
        let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::constant_delta(n, delta)));
        let results = IterationRunner::new(config(n), backend).run(&mut noop()).unwrap();

        let expected = vec![delta; n];
        prop_assert_eq!(
            results.series(MetricKind::Wallclock),
            Some(Series::Flat(&expected[..]))
        );
    }

    #[test]
    fn every_per_core_row_has_one_value_per_iteration(cores in 1usize..5, n in 1usize..8) {
        let wallclock = (0..n).map(|i| (i as f64, i as f64 + 0.5)).collect();
        let cycles = (0..n)
            .map(|i| (0..cores).map(|c| (i as u64, (i + c + 1) as u64)).collect())
            .collect();
        let snapshot = ScriptedSnapshot::new(cores, wallclock).counter(MetricKind::CoreCycles, cycles);
        let results = IterationRunner::new(config(n), Backend::MultiCoreSnapshot(Box::new(snapshot)))
            .run(&mut noop())
            .unwrap();

        for metric in MetricKind::COUNTERS {
            match results.series(metric) {
                Some(Series::PerCore(rows)) => {
                    prop_assert_eq!(rows.len(), cores);
                    prop_assert!(rows.iter().all(|row| row.len() == n));
                }
                other => prop_assert!(false, "unexpected series {:?}", other),
            }
        }
        match results.series(MetricKind::Wallclock) {
            Some(Series::Flat(row)) => prop_assert_eq!(row.len(), n),
            other => prop_assert!(false, "unexpected series {:?}", other),
        }
    }

    #[test]
    fn serialising_twice_is_byte_identical(deltas in prop::collection::vec(0.0f64..1e6, 1..30)) {
        let pairs = deltas.iter().map(|d| (0.0, *d)).collect();
        let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::new(pairs)));
        let results = IterationRunner::new(config(deltas.len()), backend)
            .run(&mut noop())
            .unwrap();

        for shape in [OutputShape::Flat, OutputShape::Nested, OutputShape::Keyed] {
            let first = render(&results, shape).unwrap();
            let second = render(&results, shape).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
