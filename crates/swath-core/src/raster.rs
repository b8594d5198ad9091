//! Software triangle rasterizer for coverage tracking.
//!
//! The mapping subsystem produces triangle strips; this engine fills
//! those triangles into a flat framebuffer of saturating counters
//! (`y * width + x`, row 0 at the southern edge) and derives the same
//! overlap statistics as [`CoverageGrid`].
//!
//! Two span rules are supported:
//!
//! - [`FillRule::Inclusive`] truncates vertices to whole pixels and fills
//!   closed spans, drawing the middle row of each triangle from both
//!   halves. Triangle pairs therefore double-count their shared diagonal,
//!   which the wider [`OverlapBuckets::TRIANGLE_PAIR`] thresholds absorb.
//! - [`FillRule::HalfOpen`] samples pixel centres and fills half-open
//!   spans, so a triangle pair covers every pixel of its quad exactly once
//!   and the plain [`OverlapBuckets::SINGLE_PASS`] thresholds apply.
//!
//! [`CoverageGrid`]: crate::coverage::CoverageGrid

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::CoverageConfig;
use crate::coverage::{CoverageEngine, CoverageQuad};
use crate::geometry::{Bounds, Point2};
use crate::overlap::{CoverageHistogram, OverlapBuckets, OverlapStats};

/// Span rule used when filling triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillRule {
    /// Closed spans on truncated integer vertices.
    #[default]
    Inclusive,
    /// Half-open spans sampled at pixel centres.
    HalfOpen,
}

impl FillRule {
    /// Bucket thresholds matched to this rule.
    #[must_use]
    pub const fn buckets(self) -> OverlapBuckets {
        match self {
            Self::Inclusive => OverlapBuckets::TRIANGLE_PAIR,
            Self::HalfOpen => OverlapBuckets::SINGLE_PASS,
        }
    }
}

/// Overlap statistics plus framebuffer diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterStats {
    pub stats: OverlapStats,
    /// Highest counter in the framebuffer.
    pub max_coverage: u8,
    /// Number of pixels touched at least once.
    pub non_zero: u64,
}

/// Flat framebuffer of coverage counters filled by scanline triangles.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleRasterizer {
    origin: Point2,
    pixels_per_metre: f64,
    width: usize,
    height: usize,
    fill_rule: FillRule,
    framebuffer: Vec<u8>,
}

impl TriangleRasterizer {
    /// Extent used when no boundary is loaded. Not padded.
    pub const DEFAULT_BOUNDS: Bounds = Bounds {
        min: Point2::new(-50.0, -100.0),
        max: Point2::new(50.0, 100.0),
    };

    /// Allocate a framebuffer for the given field bounds.
    ///
    /// With bounds, the extent is grown by `config.padding`; without,
    /// [`DEFAULT_BOUNDS`](Self::DEFAULT_BOUNDS) is used as is. The size in
    /// pixels is rounded up and capped at
    /// `config.max_columns × config.max_rows`.
    #[must_use]
    pub fn configure(bounds: Option<Bounds>, config: &CoverageConfig) -> Self {
        let extent = bounds.map_or(Self::DEFAULT_BOUNDS, |b| b.padded(config.padding));
        let ppm = config.raster_pixels_per_metre;
        let width = pixels_for(extent.width(), ppm).min(config.max_columns);
        let height = pixels_for(extent.height(), ppm).min(config.max_rows);
        info!(
            "[Raster] framebuffer {width}x{height} px at {ppm} px/m, {:?} spans",
            config.fill_rule
        );
        Self::new(extent.min, ppm, width, height).with_fill_rule(config.fill_rule)
    }

    /// Allocate a zeroed framebuffer directly.
    #[must_use]
    pub fn new(origin: Point2, pixels_per_metre: f64, width: usize, height: usize) -> Self {
        Self {
            origin,
            pixels_per_metre,
            width,
            height,
            fill_rule: FillRule::default(),
            framebuffer: vec![0; width * height],
        }
    }

    /// Select the span rule.
    #[must_use]
    pub const fn with_fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    #[must_use]
    pub const fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub const fn origin(&self) -> Point2 {
        self.origin
    }

    #[must_use]
    pub const fn pixels_per_metre(&self) -> f64 {
        self.pixels_per_metre
    }

    /// Raw counters, `y * width + x`.
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Counter under a world point; zero outside the framebuffer.
    #[must_use]
    pub fn pixel_at(&self, p: Point2) -> u8 {
        let (x, y) = self.to_pixel(p);
        let (Some(x), Some(y)) = (
            index_in(truncate(x), self.width),
            index_in(truncate(y), self.height),
        ) else {
            return 0;
        };
        self.framebuffer[y * self.width + x]
    }

    fn to_pixel(&self, p: Point2) -> (f64, f64) {
        (
            (p.easting - self.origin.easting) * self.pixels_per_metre,
            (p.northing - self.origin.northing) * self.pixels_per_metre,
        )
    }

    /// Fill one triangle given in world coordinates.
    ///
    /// Triangles with non-finite coordinates are ignored.
    pub fn render_triangle(&mut self, v0: Point2, v1: Point2, v2: Point2) {
        let finite = [v0, v1, v2]
            .iter()
            .all(|p| p.easting.is_finite() && p.northing.is_finite());
        if self.framebuffer.is_empty() || !finite {
            return;
        }
        match self.fill_rule {
            FillRule::Inclusive => self.render_inclusive(v0, v1, v2),
            FillRule::HalfOpen => self.render_half_open(v0, v1, v2),
        }
    }

    fn render_inclusive(&mut self, v0: Point2, v1: Point2, v2: Point2) {
        let to_int = |p: Point2| {
            let (x, y) = self.to_pixel(p);
            (truncate(x), truncate(y))
        };
        let mut a = to_int(v0);
        let mut b = to_int(v1);
        let mut c = to_int(v2);
        if a.1 > b.1 {
            std::mem::swap(&mut a, &mut b);
        }
        if a.1 > c.1 {
            std::mem::swap(&mut a, &mut c);
        }
        if b.1 > c.1 {
            std::mem::swap(&mut b, &mut c);
        }
        let ((x0, y0), (x1, y1), (x2, y2)) = (a, b, c);
        if y0 == y2 {
            return;
        }

        let long_x = |y: i64| lerp_f32(x0, x2, y, y0, y2);
        if y1 > y0 {
            for y in self.row_range(y0, y1) {
                let short = lerp_f32(x0, x1, y, y0, y1);
                self.draw_closed_span(y, short, long_x(y));
            }
        }
        if y2 > y1 {
            for y in self.row_range(y1, y2) {
                let short = lerp_f32(x1, x2, y, y1, y2);
                self.draw_closed_span(y, short, long_x(y));
            }
        }
    }

    /// Rows `from..=to` clipped to the framebuffer.
    fn row_range(&self, from: i64, to: i64) -> std::ops::RangeInclusive<i64> {
        let last = i64::try_from(self.height).unwrap_or(i64::MAX) - 1;
        from.max(0)..=to.min(last)
    }

    /// Increment `x_start..=x_end` on row `y`, both ends clamped to the
    /// framebuffer. A span lying wholly off one side collapses onto the
    /// edge column.
    fn draw_closed_span(&mut self, y: i64, x_start: i64, x_end: i64) {
        let (x_start, x_end) = if x_start > x_end {
            (x_end, x_start)
        } else {
            (x_start, x_end)
        };
        let last = i64::try_from(self.width).unwrap_or(i64::MAX) - 1;
        let (Some(row), Some(lo), Some(hi)) = (
            index_in(y, self.height),
            index_in(x_start.clamp(0, last), self.width),
            index_in(x_end.clamp(0, last), self.width),
        ) else {
            return;
        };
        self.increment_row(row, lo, hi);
    }

    fn render_half_open(&mut self, v0: Point2, v1: Point2, v2: Point2) {
        let mut a = self.to_pixel(v0);
        let mut b = self.to_pixel(v1);
        let mut c = self.to_pixel(v2);
        if a.1 > b.1 {
            std::mem::swap(&mut a, &mut b);
        }
        if a.1 > c.1 {
            std::mem::swap(&mut a, &mut c);
        }
        if b.1 > c.1 {
            std::mem::swap(&mut b, &mut c);
        }
        if c.1 <= a.1 {
            return;
        }

        // Rows whose centre lies in [a.y, c.y).
        let first = first_center_at_or_after(a.1);
        let end = first_center_at_or_after(c.1);
        let last_row = i64::try_from(self.height).unwrap_or(i64::MAX);
        for y in first.max(0)..end.min(last_row) {
            #[allow(clippy::cast_precision_loss)]
            let yc = y as f64 + 0.5;
            let long = edge_x(a, c, yc);
            let short = if yc < b.1 {
                edge_x(a, b, yc)
            } else {
                edge_x(b, c, yc)
            };
            let (xl, xr) = if long < short {
                (long, short)
            } else {
                (short, long)
            };
            self.draw_half_open_span(y, xl, xr);
        }
    }

    /// Increment every pixel on row `y` whose centre lies in `[xl, xr)`.
    fn draw_half_open_span(&mut self, y: i64, xl: f64, xr: f64) {
        let width = i64::try_from(self.width).unwrap_or(i64::MAX);
        let lo = first_center_at_or_after(xl).max(0);
        let hi = first_center_at_or_after(xr).min(width) - 1;
        if lo > hi {
            return;
        }
        let (Some(row), Some(lo), Some(hi)) = (
            index_in(y, self.height),
            index_in(lo, self.width),
            index_in(hi, self.width),
        ) else {
            return;
        };
        self.increment_row(row, lo, hi);
    }

    fn increment_row(&mut self, row: usize, lo: usize, hi: usize) {
        let offset = row * self.width;
        for px in &mut self.framebuffer[offset + lo..=offset + hi] {
            *px = px.saturating_add(1);
        }
    }

    /// Bucket the framebuffer with the thresholds of the active fill rule.
    #[must_use]
    pub fn histogram(&self) -> CoverageHistogram {
        CoverageHistogram::from_cells(&self.framebuffer, self.fill_rule.buckets())
    }

    /// Overlap statistics plus max coverage and touched-pixel count.
    #[must_use]
    pub fn calculate_overlap(&self, worked_area: f64) -> Option<RasterStats> {
        let histogram = self.histogram();
        histogram.stats(worked_area).map(|stats| RasterStats {
            stats,
            max_coverage: histogram.max_coverage,
            non_zero: histogram.non_zero,
        })
    }

    /// Zero the framebuffer.
    pub fn clear(&mut self) {
        self.framebuffer.fill(0);
    }
}

impl CoverageEngine for TriangleRasterizer {
    fn mark_quad(&mut self, quad: &CoverageQuad) {
        for [a, b, c] in quad.triangles() {
            self.render_triangle(a, b, c);
        }
    }

    fn calculate_overlap(&self, worked_area: f64) -> Option<OverlapStats> {
        Self::calculate_overlap(self, worked_area).map(|r| r.stats)
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// X of edge `a → b` at height `y`.
fn edge_x(a: (f64, f64), b: (f64, f64), y: f64) -> f64 {
    let t = (y - a.1) / (b.1 - a.1);
    t.mul_add(b.0 - a.0, a.0)
}

/// X between `from` and `to` at row `y` of the edge spanning rows
/// `y_from..=y_to`, interpolated in single precision and truncated.
/// Unfused so span ends truncate to the same column as a plain
/// multiply-then-add.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::suboptimal_flops
)]
fn lerp_f32(from: i64, to: i64, y: i64, y_from: i64, y_to: i64) -> i64 {
    let t = (y as f32 - y_from as f32) / (y_to as f32 - y_from as f32);
    (from as f32 + (to as f32 - from as f32) * t) as i64
}

/// Index of the first pixel whose centre is at or after `v`.
fn first_center_at_or_after(v: f64) -> i64 {
    truncate((v - 0.5).ceil())
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> i64 {
    value as i64
}

fn index_in(value: i64, len: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|&v| v < len)
}

fn pixels_for(extent: f64, pixels_per_metre: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let px = (extent * pixels_per_metre).ceil().max(0.0) as usize;
    px
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn raster(rule: FillRule) -> TriangleRasterizer {
        // 1 px per metre over 0..20 keeps pixel arithmetic readable.
        TriangleRasterizer::new(Point2::new(0.0, 0.0), 1.0, 20, 20).with_fill_rule(rule)
    }

    fn rect(x0: f64, x1: f64, y0: f64, y1: f64) -> CoverageQuad {
        CoverageQuad {
            left: Point2::new(x0, y1),
            right: Point2::new(x1, y1),
            prev_left: Point2::new(x0, y0),
            prev_right: Point2::new(x1, y0),
        }
    }

    #[test]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::suboptimal_flops
    )]
    fn edge_interpolation_truncates_multiply_then_add() {
        for (from, to, y_from, y_to) in [(0, 7, 0, 3), (-13, 29, 4, 11), (250, -17, 0, 9)] {
            for y in y_from..=y_to {
                let t = (y as f32 - y_from as f32) / (y_to as f32 - y_from as f32);
                let plain = (from as f32 + (to as f32 - from as f32) * t) as i64;
                assert_eq!(lerp_f32(from, to, y, y_from, y_to), plain, "y = {y}");
            }
            assert_eq!(lerp_f32(from, to, y_from, y_from, y_to), from);
            assert_eq!(lerp_f32(from, to, y_to, y_from, y_to), to);
        }
        assert_eq!(lerp_f32(0, 7, 1, 0, 3), 2);
    }

    #[test]
    fn default_extent_is_unpadded() {
        let r = TriangleRasterizer::configure(None, &CoverageConfig::default());
        assert_eq!(r.width(), 1000);
        assert_eq!(r.height(), 2000);
        assert_eq!(r.origin(), Point2::new(-50.0, -100.0));
    }

    #[test]
    fn configured_extent_is_capped() {
        let bounds = Bounds::new(Point2::new(0.0, 0.0), Point2::new(500.0, 500.0));
        let r = TriangleRasterizer::configure(Some(bounds), &CoverageConfig::default());
        assert_eq!(r.width(), 2000);
        assert_eq!(r.height(), 4000);
    }

    #[test]
    fn flat_triangle_is_skipped() {
        let mut r = raster(FillRule::Inclusive);
        r.render_triangle(
            Point2::new(1.0, 5.0),
            Point2::new(9.0, 5.0),
            Point2::new(4.0, 5.0),
        );
        assert_eq!(r.histogram().non_zero, 0);

        let mut r = raster(FillRule::HalfOpen);
        r.render_triangle(
            Point2::new(1.0, 5.0),
            Point2::new(9.0, 5.0),
            Point2::new(4.0, 5.0),
        );
        assert_eq!(r.histogram().non_zero, 0);
    }

    #[test]
    fn inclusive_pair_double_counts_diagonal() {
        let mut r = raster(FillRule::Inclusive);
        r.mark_quad(&rect(2.0, 6.0, 2.0, 10.0));
        let h = CoverageHistogram::from_cells(r.framebuffer(), OverlapBuckets::SINGLE_PASS);
        // Every pixel of the closed 5x9 block is touched, the diagonal twice.
        assert_eq!(h.non_zero, 5 * 9);
        assert_eq!(h.max_coverage, 2);
        assert!(h.twice > 0);
        // Under the triangle-pair thresholds the whole block is single pass.
        assert_eq!(r.histogram().once, 5 * 9);
    }

    #[test]
    fn half_open_pair_tiles_exactly() {
        let mut r = raster(FillRule::HalfOpen);
        r.mark_quad(&rect(2.0, 6.0, 2.0, 10.0));
        let h = r.histogram();
        assert_eq!(h.non_zero, 4 * 8);
        assert_eq!(h.max_coverage, 1);
        assert_eq!(r.pixel_at(Point2::new(2.5, 2.5)), 1);
        assert_eq!(r.pixel_at(Point2::new(6.5, 2.5)), 0);
        assert_eq!(r.pixel_at(Point2::new(2.5, 10.5)), 0);
    }

    #[test]
    fn adjacent_half_open_quads_do_not_overlap() {
        let mut r = raster(FillRule::HalfOpen);
        r.mark_quad(&rect(2.0, 6.0, 2.0, 6.0));
        r.mark_quad(&rect(2.0, 6.0, 6.0, 10.0));
        r.mark_quad(&rect(6.0, 10.0, 2.0, 10.0));
        let h = r.histogram();
        assert_eq!(h.max_coverage, 1);
        assert_eq!(h.non_zero, 8 * 8);
    }

    #[test]
    fn inclusive_span_off_left_collapses_to_edge() {
        let mut r = raster(FillRule::Inclusive);
        r.render_triangle(
            Point2::new(-10.0, 2.0),
            Point2::new(-5.0, 2.0),
            Point2::new(-8.0, 6.0),
        );
        // Legacy clamping draws the spans onto column 0.
        assert_eq!(r.pixel_at(Point2::new(0.5, 3.5)), 1);
        assert_eq!(r.pixel_at(Point2::new(1.5, 3.5)), 0);
    }

    #[test]
    fn half_open_off_screen_draws_nothing() {
        let mut r = raster(FillRule::HalfOpen);
        r.render_triangle(
            Point2::new(-10.0, 2.0),
            Point2::new(-5.0, 2.0),
            Point2::new(-8.0, 6.0),
        );
        assert_eq!(r.histogram().non_zero, 0);
    }

    #[test]
    fn overlap_reports_diagnostics() {
        let mut r = raster(FillRule::HalfOpen);
        let quad = rect(0.0, 4.0, 0.0, 5.0);
        r.mark_quad(&quad);
        r.mark_quad(&quad);
        let stats = r.calculate_overlap(40.0).unwrap();
        assert_eq!(stats.max_coverage, 2);
        assert_eq!(stats.non_zero, 20);
        assert_abs_diff_eq!(stats.stats.overlap_percent, 50.0);
        assert_abs_diff_eq!(stats.stats.actual_area_covered, 20.0);
    }

    #[test]
    fn clear_zeroes_framebuffer() {
        let mut r = raster(FillRule::Inclusive);
        r.mark_quad(&rect(1.0, 5.0, 1.0, 5.0));
        r.clear();
        assert!(r.framebuffer().iter().all(|&p| p == 0));
        assert!(r.calculate_overlap(0.01).is_none());
    }

    #[test]
    fn fill_rules_pick_matching_buckets() {
        assert_eq!(FillRule::Inclusive.buckets(), OverlapBuckets::TRIANGLE_PAIR);
        assert_eq!(FillRule::HalfOpen.buckets(), OverlapBuckets::SINGLE_PASS);
        assert_eq!(FillRule::default(), FillRule::Inclusive);
    }
}
