//! Overlap statistics shared by both coverage engines.
//!
//! A coverage buffer is a flat array of saturating pass counters. The
//! statistics pass buckets every non-zero counter into "once", "twice"
//! and "more", then weights them so that a cell covered twice counts
//! as two units of applied area:
//!
//! ```text
//! total  = once + twice + more
//! total2 = total + twice + 2 * more
//! actual = total / total2 * worked_area
//! overlap% = round2((1 - total / total2) * 100)
//! ```

use serde::{Deserialize, Serialize};

/// Worked area below which the statistics are not meaningful, m².
pub const MIN_WORKED_AREA: f64 = 0.1;

/// Counter thresholds separating the three buckets.
///
/// A counter `c > 0` is "once" below `twice_from`, "twice" below
/// `more_from`, and "more" otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapBuckets {
    pub twice_from: u8,
    pub more_from: u8,
}

impl OverlapBuckets {
    /// 1 / 2 / 3+: one increment per pass.
    pub const SINGLE_PASS: Self = Self {
        twice_from: 2,
        more_from: 3,
    };

    /// 1–2 / 3–5 / 6+: compensates for triangle pairs that share their
    /// diagonal and middle row under closed-span filling.
    pub const TRIANGLE_PAIR: Self = Self {
        twice_from: 3,
        more_from: 6,
    };
}

/// Bucketed counts over a coverage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageHistogram {
    pub once: u64,
    pub twice: u64,
    pub more: u64,
    /// Highest counter seen.
    pub max_coverage: u8,
    /// Number of non-zero counters.
    pub non_zero: u64,
}

impl CoverageHistogram {
    /// Bucket every counter in `cells`.
    #[must_use]
    pub fn from_cells(cells: &[u8], buckets: OverlapBuckets) -> Self {
        cells
            .iter()
            .filter(|&&c| c > 0)
            .fold(Self::default(), |mut h, &c| {
                h.non_zero += 1;
                h.max_coverage = h.max_coverage.max(c);
                if c >= buckets.more_from {
                    h.more += 1;
                } else if c >= buckets.twice_from {
                    h.twice += 1;
                } else {
                    h.once += 1;
                }
                h
            })
    }

    /// Number of bucketed counters.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.once + self.twice + self.more
    }

    /// Pass-weighted total: twice counts double, more counts triple.
    #[must_use]
    pub const fn weighted_total(&self) -> u64 {
        self.total() + self.twice + 2 * self.more
    }

    /// Area and overlap statistics for `worked_area` square metres of
    /// recorded work.
    ///
    /// Returns `None` when `worked_area` is below [`MIN_WORKED_AREA`].
    /// An empty histogram yields zero area and zero overlap.
    #[must_use]
    pub fn stats(&self, worked_area: f64) -> Option<OverlapStats> {
        if worked_area < MIN_WORKED_AREA {
            return None;
        }
        let total2 = self.weighted_total();
        if total2 == 0 {
            return Some(OverlapStats::default());
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.total() as f64 / total2 as f64;
        Some(OverlapStats {
            actual_area_covered: ratio * worked_area,
            overlap_percent: round_to_hundredths((1.0 - ratio) * 100.0),
        })
    }
}

/// The pair of statistics every coverage engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OverlapStats {
    /// Worked area scaled by the single-coverage ratio, m².
    pub actual_area_covered: f64,
    /// Share of applied area that landed on already covered ground, %.
    pub overlap_percent: f64,
}

/// Round to two decimals, ties to even.
fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
