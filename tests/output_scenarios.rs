//! End-to-end scenarios: scripted backend in, rendered JSON out.

use iteration_runner::cli::execute_with;
use iteration_runner::testing::{CallLog, ScriptedCounters, ScriptedSnapshot};
use iteration_runner::{
    benchmark, load_benchmark, Backend, BenchmarkError, MetricKind, RunConfig,
};
use std::cell::Cell;

#[benchmark]
fn scenario_noop(_param: i32) {}

fn run(config: RunConfig, backend: Backend) -> anyhow::Result<String> {
    let mut out = Vec::new();
    execute_with(config, move |_| Ok(backend), &mut out)?;
    Ok(String::from_utf8(out)?)
}

fn config(iterations: usize) -> RunConfig {
    RunConfig::new().benchmark("scenario_noop").iterations(iterations)
}

#[test]
fn should_emit_wallclock_deltas_as_flat_array() {
    let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::new(vec![
        (0.0, 1.0),
        (2.0, 4.0),
        (5.0, 5.5),
    ])));
    assert_eq!(run(config(3), backend).unwrap(), "[1.0,2.0,0.5]\n");
}

#[test]
fn should_emit_nested_arrays_for_single_core_counters() {
    let counters = ScriptedCounters::new(vec![(0.0, 0.5), (1.0, 1.25)])
        .cycles(vec![(100, 250), (300, 400)])
        .aperf(vec![(10, 20), (20, 40)])
        .mperf(vec![(10, 30), (30, 50)]);
    let backend = Backend::WallclockCyclesAperfMperf(Box::new(counters));
    assert_eq!(
        run(config(2), backend).unwrap(),
        "[[0.5,0.25],[150.0,100.0],[10.0,20.0],[20.0,20.0]]\n"
    );
}

#[test]
fn should_keep_core_major_order_when_keyed() {
    let snapshot = ScriptedSnapshot::new(2, vec![(0.0, 2.0), (2.0, 3.0)]).counter(
        MetricKind::CoreCycles,
        vec![vec![(0, 10), (0, 30)], vec![(10, 30), (30, 70)]],
    );
    let backend = Backend::MultiCoreSnapshot(Box::new(snapshot));
    assert_eq!(
        run(config(2), backend).unwrap(),
        "{\"wallclock_times\":[2.0,1.0],\
         \"core_cycle_counts\":[[10.0,20.0],[30.0,40.0]],\
         \"aperf_counts\":[[0.0,0.0],[0.0,0.0]],\
         \"mperf_counts\":[[0.0,0.0],[0.0,0.0]]}\n"
    );
}

#[test]
fn should_produce_no_output_when_iteration_two_of_five_inverts() {
    let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::new(vec![
        (0.0, 1.0),
        (1.0, 2.0),
        (3.0, 2.5),
        (4.0, 5.0),
        (5.0, 6.0),
    ])));
    let mut out = Vec::new();
    let err = execute_with(config(5), move |_| Ok(backend), &mut out).unwrap_err();
    assert!(format!("{err:#}").contains("wallclock error: start=3, stop=2.5"));
    assert!(out.is_empty());
}

#[test]
fn should_honour_forced_shape() {
    let backend = Backend::WallclockOnly(Box::new(ScriptedCounters::new(vec![(1.0, 1.5)])));
    let cfg = config(1).shape(iteration_runner::OutputShape::Keyed);
    assert_eq!(run(cfg, backend).unwrap(), "{\"wallclock_times\":[0.5]}\n");
}

#[test]
fn should_fail_before_any_backend_call_when_library_unloadable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libbench.so");
    std::fs::write(&path, b"\x7fELF truncated").unwrap();

    let opened = Cell::new(false);
    let calls = CallLog::new();
    let cfg = RunConfig::new().benchmark(path.to_str().unwrap()).iterations(1);
    let mut out = Vec::new();
    let result = execute_with(
        cfg,
        |_| {
            opened.set(true);
            Ok(Backend::WallclockOnly(Box::new(
                ScriptedCounters::new(vec![(0.0, 1.0)]).with_log(calls.clone()),
            )))
        },
        &mut out,
    );

    assert!(result.is_err());
    assert!(!opened.get());
    assert!(calls.calls().is_empty());
    assert!(out.is_empty());
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn should_fail_before_any_backend_call_when_entry_point_missing() {
    match load_benchmark("libm.so.6") {
        Err(BenchmarkError::MissingEntryPoint { path }) => assert_eq!(path, "libm.so.6"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("libm unexpectedly exports run_iter"),
    }

    let opened = Cell::new(false);
    let mut out = Vec::new();
    let err = execute_with(
        RunConfig::new().benchmark("libm.so.6").iterations(1),
        |_| {
            opened.set(true);
            Ok(Backend::WallclockOnly(Box::new(ScriptedCounters::new(vec![(0.0, 1.0)]))))
        },
        &mut out,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("missing a 'run_iter' function"));
    assert!(!opened.get());
    assert!(out.is_empty());
}

#[test]
fn should_report_not_found_for_unknown_benchmark() {
    assert!(matches!(
        load_benchmark("definitely_not_registered"),
        Err(BenchmarkError::NotFound(_))
    ));
}
