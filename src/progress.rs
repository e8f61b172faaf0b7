//! Progress fraction reporting for bulk transfers.

use std::sync::Arc;

/// Caller-supplied sink receiving progress fractions in `[0, 1]`.
pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Converts raw rows-transferred counters into a bounded `[0, 1]` fraction.
///
/// Fractions are clamped and rounded to 4 decimal places. When the total row
/// count is zero no fraction exists; reporting is skipped rather than
/// dividing by zero.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    total_rows: u64,
}

impl ProgressReporter {
    /// Creates a reporter for a transfer of `total_rows` rows.
    pub fn new(total_rows: u64) -> Self {
        Self { total_rows }
    }

    /// Returns the progress fraction for a rows-transferred counter.
    ///
    /// Returns [`None`] when the total row count is zero.
    pub fn fraction(&self, rows_transferred: u64) -> Option<f64> {
        if self.total_rows == 0 {
            return None;
        }

        let bounded = rows_transferred.min(self.total_rows);
        let fraction = bounded as f64 / self.total_rows as f64;

        Some((fraction * 10_000.0).round() / 10_000.0)
    }

    /// Computes the fraction and forwards it to the sink, if any.
    pub fn report(&self, rows_transferred: u64, sink: Option<&ProgressSink>) {
        if let Some(sink) = sink
            && let Some(fraction) = self.fraction(rows_transferred)
        {
            sink(fraction);
        }
    }
}
