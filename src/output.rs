//! Rendering a [`ResultMatrix`] for the downstream statistics pipeline.
//!
//! Three shapes are supported:
//!
//! - `Flat`: `[d0, d1, ...]`, for runs recording a single metric.
//! - `Nested`: one sequence per metric in canonical order, for single-core
//!   runs recording several metrics.
//! - `Keyed`: `{"wallclock_times": [...], "core_cycle_counts": [[...], ...]}`,
//!   with per-core metrics indexed by core.
//!
//! Values are written by `serde_json`, which always keeps a fractional part
//! (`1.0`, never `1`) and round-trips every finite `f64` exactly. Output is
//! compact, keys follow the canonical metric order, and the document ends
//! with a single newline.

use crate::backend::MetricKind;
use crate::buffer::{Layout, ResultMatrix, Series};
use crate::error::OutputError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::Write;

/// Shape of the primary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputShape {
    Flat,
    Nested,
    Keyed,
}

impl OutputShape {
    /// The natural shape for a layout: keyed when anything is per-core,
    /// flat for a single metric, nested otherwise.
    pub fn default_for(layout: &Layout) -> Self {
        if !layout.per_core_metrics().is_empty() {
            OutputShape::Keyed
        } else if layout.flat_metrics().len() == 1 {
            OutputShape::Flat
        } else {
            OutputShape::Nested
        }
    }

    fn name(self) -> &'static str {
        match self {
            OutputShape::Flat => "flat",
            OutputShape::Nested => "nested",
            OutputShape::Keyed => "keyed",
        }
    }
}

impl Serialize for Series<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Series::Flat(values) => values.serialize(serializer),
            Series::PerCore(rows) => rows.serialize(serializer),
        }
    }
}

struct Keyed<'a>(&'a ResultMatrix);

impl Serialize for Keyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let metrics = self.0.layout().metrics();
        let mut map = serializer.serialize_map(Some(metrics.len()))?;
        for metric in metrics {
            if let Some(series) = self.0.series(metric) {
                map.serialize_entry(metric.key(), &series)?;
            }
        }
        map.end()
    }
}

fn flat_rows(matrix: &ResultMatrix, shape: OutputShape) -> Result<Vec<&[f64]>, OutputError> {
    if !matrix.layout().per_core_metrics().is_empty() {
        return Err(OutputError::Unrepresentable {
            shape: shape.name(),
            reason: "per-core metrics need keyed output",
        });
    }
    Ok(matrix
        .layout()
        .flat_metrics()
        .iter()
        .filter_map(|&m| match matrix.series(m) {
            Some(Series::Flat(values)) => Some(values),
            _ => None,
        })
        .collect())
}

/// Write `matrix` to `out` in the given shape.
pub fn write_output<W: Write>(
    matrix: &ResultMatrix,
    shape: OutputShape,
    mut out: W,
) -> Result<(), OutputError> {
    match shape {
        OutputShape::Flat => {
            let rows = flat_rows(matrix, shape)?;
            let [values] = rows.as_slice() else {
                return Err(OutputError::Unrepresentable {
                    shape: shape.name(),
                    reason: "flat output holds exactly one metric",
                });
            };
            serde_json::to_writer(&mut out, values)?;
        }
        OutputShape::Nested => {
            let rows = flat_rows(matrix, shape)?;
            serde_json::to_writer(&mut out, &rows)?;
        }
        OutputShape::Keyed => serde_json::to_writer(&mut out, &Keyed(matrix))?,
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Render `matrix` to a string, newline included.
pub fn render(matrix: &ResultMatrix, shape: OutputShape) -> Result<String, OutputError> {
    let mut buf = Vec::new();
    write_output(matrix, shape, &mut buf)?;
    // serde_json only emits UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
