//! Pre-allocated storage for per-iteration deltas.
//!
//! Every row is allocated to its full length before the first iteration and
//! filled with [`SENTINEL`]. Rows are written strictly in iteration order and
//! nothing reallocates while the measurement loop is running.

use crate::backend::MetricKind;
use crate::error::BufferError;

/// Placeholder stored in every slot until a real delta overwrites it.
///
/// Deltas are never negative, so a leftover sentinel marks an iteration
/// that never completed.
pub const SENTINEL: f64 = -1.0;

/// Which metrics a run records and how many cores carry per-core rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    flat: Vec<MetricKind>,
    per_core: Vec<MetricKind>,
    num_cores: usize,
}

impl Layout {
    /// One row per metric, no per-core rows.
    pub fn single_core(metrics: &[MetricKind]) -> Self {
        let mut flat = metrics.to_vec();
        flat.sort();
        flat.dedup();
        Self {
            flat,
            per_core: Vec::new(),
            num_cores: 0,
        }
    }

    /// Wallclock as a single row, every hardware counter once per core.
    pub fn multi_core(num_cores: usize) -> Self {
        Self {
            flat: vec![MetricKind::Wallclock],
            per_core: MetricKind::COUNTERS.to_vec(),
            num_cores,
        }
    }

    /// Metrics stored as a single row.
    pub fn flat_metrics(&self) -> &[MetricKind] {
        &self.flat
    }

    /// Metrics stored as one row per core.
    pub fn per_core_metrics(&self) -> &[MetricKind] {
        &self.per_core
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// Every metric this layout records, in canonical order.
    pub fn metrics(&self) -> Vec<MetricKind> {
        let mut all: Vec<_> = self.flat.iter().chain(&self.per_core).copied().collect();
        all.sort();
        all
    }

    pub fn is_per_core(&self, metric: MetricKind) -> bool {
        self.per_core.contains(&metric)
    }

    /// Total number of rows: flat rows first, then per-core rows grouped
    /// by metric.
    pub fn row_count(&self) -> usize {
        self.flat.len() + self.per_core.len() * self.num_cores
    }

    fn row_keys(&self) -> Vec<(MetricKind, Option<usize>)> {
        let flat = self.flat.iter().map(|&m| (m, None));
        let per_core = self
            .per_core
            .iter()
            .flat_map(|&m| (0..self.num_cores).map(move |core| (m, Some(core))));
        flat.chain(per_core).collect()
    }
}

/// Read-only view of one metric's data.
#[derive(Debug, Clone, PartialEq)]
pub enum Series<'a> {
    Flat(&'a [f64]),
    /// Indexed by core.
    PerCore(Vec<&'a [f64]>),
}

#[derive(Debug)]
struct Row {
    metric: MetricKind,
    core: Option<usize>,
    values: Vec<f64>,
    /// Next iteration to be written.
    cursor: usize,
}

/// Per-metric, per-core, per-iteration deltas.
#[derive(Debug)]
pub struct ResultMatrix {
    layout: Layout,
    iterations: usize,
    rows: Vec<Row>,
}

impl ResultMatrix {
    /// Allocate every row at full length, filled with [`SENTINEL`].
    pub fn allocate(layout: Layout, iterations: usize) -> Self {
        let rows = layout
            .row_keys()
            .into_iter()
            .map(|(metric, core)| Row {
                metric,
                core,
                values: vec![SENTINEL; iterations],
                cursor: 0,
            })
            .collect();
        Self {
            layout,
            iterations,
            rows,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Store the delta of `metric` (on `core`, for per-core metrics) for
    /// iteration `iter`. Iterations must arrive in order.
    pub fn record(
        &mut self,
        metric: MetricKind,
        core: Option<usize>,
        iter: usize,
        delta: f64,
    ) -> Result<(), BufferError> {
        let row = self
            .rows
            .iter()
            .position(|r| r.metric == metric && r.core == core)
            .ok_or(BufferError::UnknownRow { metric, core })?;
        self.record_row(row, iter, delta)
    }

    /// `(metric, core)` of row `row`, in storage order.
    pub(crate) fn row_key(&self, row: usize) -> (MetricKind, Option<usize>) {
        let r = &self.rows[row];
        (r.metric, r.core)
    }

    pub(crate) fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub(crate) fn record_row(&mut self, row: usize, iter: usize, delta: f64) -> Result<(), BufferError> {
        let capacity = self.iterations;
        let r = &mut self.rows[row];
        if iter >= capacity {
            return Err(BufferError::Overflow { iter, capacity });
        }
        if iter != r.cursor {
            return Err(BufferError::OutOfOrder {
                metric: r.metric,
                core: r.core,
                iter,
                expected: r.cursor,
            });
        }
        r.values[iter] = delta;
        r.cursor += 1;
        Ok(())
    }

    /// Whether every slot of every row has been written.
    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|r| r.cursor == self.iterations)
    }

    /// All rows of `metric`, or `None` if the layout does not record it.
    pub fn series(&self, metric: MetricKind) -> Option<Series<'_>> {
        if self.layout.flat.contains(&metric) {
            return self
                .rows
                .iter()
                .find(|r| r.metric == metric && r.core.is_none())
                .map(|r| Series::Flat(&r.values));
        }
        if self.layout.is_per_core(metric) {
            let per_core = self
                .rows
                .iter()
                .filter(|r| r.metric == metric && r.core.is_some())
                .map(|r| r.values.as_slice())
                .collect();
            return Some(Series::PerCore(per_core));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_prefill_with_sentinel_when_allocated() {
        let matrix = ResultMatrix::allocate(Layout::single_core(&[MetricKind::Wallclock]), 3);
        assert_eq!(
            matrix.series(MetricKind::Wallclock),
            Some(Series::Flat(&[SENTINEL; 3][..]))
        );
        assert!(!matrix.is_complete());
    }

    #[test]
    fn should_allocate_per_core_rows_when_multi_core() {
        let layout = Layout::multi_core(2);
        assert_eq!(layout.row_count(), 1 + 3 * 2);
        let matrix = ResultMatrix::allocate(layout, 4);
        match matrix.series(MetricKind::Aperf) {
            Some(Series::PerCore(rows)) => {
                assert_eq!(rows.len(), 2);
                assert!(rows.iter().all(|r| r.len() == 4));
            }
            other => panic!("unexpected series {other:?}"),
        }
    }

    #[test]
    fn should_keep_canonical_order_when_single_core_metrics_unordered() {
        let layout = Layout::single_core(&[MetricKind::Mperf, MetricKind::Wallclock]);
        assert_eq!(layout.flat_metrics(), &[MetricKind::Wallclock, MetricKind::Mperf]);
    }

    #[test]
    fn should_store_deltas_in_order() {
        let mut matrix = ResultMatrix::allocate(Layout::single_core(&[MetricKind::Wallclock]), 2);
        matrix.record(MetricKind::Wallclock, None, 0, 1.5).unwrap();
        matrix.record(MetricKind::Wallclock, None, 1, 0.5).unwrap();
        assert!(matrix.is_complete());
        assert_eq!(
            matrix.series(MetricKind::Wallclock),
            Some(Series::Flat(&[1.5, 0.5][..]))
        );
    }

    #[test]
    fn should_reject_out_of_order_writes() {
        let mut matrix = ResultMatrix::allocate(Layout::single_core(&[MetricKind::Wallclock]), 3);
        let err = matrix.record(MetricKind::Wallclock, None, 1, 1.0).unwrap_err();
        assert_eq!(
            err,
            BufferError::OutOfOrder {
                metric: MetricKind::Wallclock,
                core: None,
                iter: 1,
                expected: 0,
            }
        );
    }

    #[test]
    fn should_reject_write_past_capacity() {
        let mut matrix = ResultMatrix::allocate(Layout::single_core(&[MetricKind::Wallclock]), 1);
        matrix.record(MetricKind::Wallclock, None, 0, 1.0).unwrap();
        let err = matrix.record(MetricKind::Wallclock, None, 1, 1.0).unwrap_err();
        assert_eq!(err, BufferError::Overflow { iter: 1, capacity: 1 });
    }

    #[test]
    fn should_reject_unknown_rows() {
        let mut matrix = ResultMatrix::allocate(Layout::multi_core(1), 1);
        assert!(matches!(
            matrix.record(MetricKind::Aperf, Some(1), 0, 1.0),
            Err(BufferError::UnknownRow { .. })
        ));
        assert!(matrix.series(MetricKind::Wallclock).is_some());
        let single = ResultMatrix::allocate(Layout::single_core(&[MetricKind::Wallclock]), 1);
        assert!(single.series(MetricKind::Mperf).is_none());
    }

    #[test]
    fn should_allow_zero_iterations() {
        let matrix = ResultMatrix::allocate(Layout::multi_core(2), 0);
        assert!(matrix.is_complete());
    }
}
