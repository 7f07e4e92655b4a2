//! Paired readings and their deltas.

use crate::backend::{MetricKind, Reading};
use crate::error::MeasureError;

/// The before/after readings of one metric for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub metric: MetricKind,
    /// `None` for metrics that are not per-core.
    pub core: Option<usize>,
    pub start: Reading,
    pub stop: Reading,
}

impl Sample {
    /// `stop - start`, after checking that the reading did not move
    /// backwards.
    ///
    /// Wallclock readings and their delta must be finite. Counter deltas
    /// must be exactly representable as `f64`; anything that would be
    /// rounded is reported rather than silently stored.
    #[inline]
    pub fn delta(&self) -> Result<f64, MeasureError> {
        match (self.start, self.stop) {
            (Reading::Seconds(start), Reading::Seconds(stop)) => {
                if !start.is_finite() || !stop.is_finite() {
                    return Err(self.non_finite());
                }
                if start > stop {
                    return Err(self.non_monotonic());
                }
                let delta = stop - start;
                if !delta.is_finite() {
                    return Err(self.non_finite());
                }
                Ok(delta)
            }
            (Reading::Count(start), Reading::Count(stop)) => {
                if start > stop {
                    return Err(self.non_monotonic());
                }
                let delta = stop - start;
                let as_float = delta as f64;
                // u128 so that a delta rounded up to 2^64 cannot saturate
                // back to u64::MAX.
                if as_float as u128 != u128::from(delta) {
                    return Err(MeasureError::PrecisionLoss {
                        metric: self.metric,
                        core: self.core,
                        delta,
                    });
                }
                Ok(as_float)
            }
            _ => Err(MeasureError::MixedReadings {
                metric: self.metric,
                core: self.core,
                start: self.start,
                stop: self.stop,
            }),
        }
    }

    fn non_monotonic(&self) -> MeasureError {
        MeasureError::NonMonotonic {
            metric: self.metric,
            core: self.core,
            start: self.start,
            stop: self.stop,
        }
    }

    fn non_finite(&self) -> MeasureError {
        MeasureError::NonFinite {
            metric: self.metric,
            core: self.core,
            start: self.start,
            stop: self.stop,
        }
    }
}
