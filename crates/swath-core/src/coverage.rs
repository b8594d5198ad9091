//! Grid-based coverage tracking.
//!
//! [`CoverageGrid`] keeps a saturating pass counter per square cell over
//! the padded field extent and fills the quadrilateral swept by a
//! mapped zone between two ticks with an integer scanline. It is the
//! reference coverage engine; [`TriangleRasterizer`] is the alternate
//! one fed with the same geometry split into triangle pairs.
//!
//! [`TriangleRasterizer`]: crate::raster::TriangleRasterizer

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::CoverageConfig;
use crate::geometry::{Bounds, Point2};
use crate::overlap::{CoverageHistogram, OverlapBuckets, OverlapStats};

/// Quadrilateral swept by one mapped zone between two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageQuad {
    /// Left edge point this tick.
    pub left: Point2,
    /// Right edge point this tick.
    pub right: Point2,
    /// Left edge point the previous tick.
    pub prev_left: Point2,
    /// Right edge point the previous tick.
    pub prev_right: Point2,
}

impl CoverageQuad {
    /// The two triangles a triangle-strip renderer draws for this quad:
    /// `(prev_left, prev_right, left)` and `(prev_right, left, right)`.
    #[must_use]
    pub const fn triangles(&self) -> [[Point2; 3]; 2] {
        [
            [self.prev_left, self.prev_right, self.left],
            [self.prev_right, self.left, self.right],
        ]
    }

    /// Area of the two triangles, m².
    #[must_use]
    pub fn area(&self) -> f64 {
        self.triangles()
            .iter()
            .map(|[a, b, c]| crate::geometry::triangle_area(*a, *b, *c))
            .sum()
    }
}

/// A coverage engine: accumulates swept quads and reports overlap.
pub trait CoverageEngine {
    /// Record one swept quad.
    fn mark_quad(&mut self, quad: &CoverageQuad);

    /// Area and overlap statistics for `worked_area` m² of recorded work,
    /// or `None` when the worked area is too small to be meaningful.
    fn calculate_overlap(&self, worked_area: f64) -> Option<OverlapStats>;

    /// Zero every counter, keeping the allocation.
    fn reset(&mut self);
}

/// Saturating per-cell pass counters over a rectangular extent.
///
/// Cells are stored row-major: the counter for column `x`, row `y` is at
/// `y * columns + x`. Row 0 is the southern edge.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageGrid {
    origin: Point2,
    resolution: f64,
    columns: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl CoverageGrid {
    /// Extent used when no boundary is loaded. Not padded.
    pub const DEFAULT_BOUNDS: Bounds = Bounds {
        min: Point2::new(-50.0, -100.0),
        max: Point2::new(50.0, 100.0),
    };

    /// Allocate a grid for the given field bounds.
    ///
    /// With bounds, the extent is the bounds grown by `config.padding`,
    /// divided into `config.grid_resolution` cells (rounded up) and
    /// capped at `config.max_columns × config.max_rows`. Without bounds
    /// [`DEFAULT_BOUNDS`](Self::DEFAULT_BOUNDS) is used as is.
    #[must_use]
    pub fn configure(bounds: Option<Bounds>, config: &CoverageConfig) -> Self {
        let resolution = config.grid_resolution;
        let extent = bounds.map_or(Self::DEFAULT_BOUNDS, |b| b.padded(config.padding));
        let columns = cells_for(extent.width(), resolution).min(config.max_columns);
        let rows = cells_for(extent.height(), resolution).min(config.max_rows);
        let grid = Self::with_resolution(extent.min, resolution, columns, rows);
        info!(
            "[Coverage] grid {}x{} cells at {} m from ({:.1}, {:.1})",
            grid.columns, grid.rows, grid.resolution, grid.origin.easting, grid.origin.northing
        );
        grid
    }

    /// Allocate a zeroed grid directly.
    #[must_use]
    pub fn with_resolution(origin: Point2, resolution: f64, columns: usize, rows: usize) -> Self {
        Self {
            origin,
            resolution,
            columns,
            rows,
            cells: vec![0; columns * rows],
        }
    }

    #[must_use]
    pub const fn origin(&self) -> Point2 {
        self.origin
    }

    #[must_use]
    pub const fn resolution(&self) -> f64 {
        self.resolution
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Raw counters, row-major from the southern edge.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Cell coordinates of a world point, truncated towards zero. The
    /// result may lie outside the grid.
    #[must_use]
    pub fn world_to_cell(&self, p: Point2) -> (i64, i64) {
        (
            truncate((p.easting - self.origin.easting) / self.resolution),
            truncate((p.northing - self.origin.northing) / self.resolution),
        )
    }

    /// Counter at a world point; zero outside the grid.
    #[must_use]
    pub fn coverage_at(&self, p: Point2) -> u8 {
        let (x, y) = self.world_to_cell(p);
        self.index(x, y).map_or(0, |i| self.cells[i])
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let x = usize::try_from(x).ok().filter(|&x| x < self.columns)?;
        let y = usize::try_from(y).ok().filter(|&y| y < self.rows)?;
        Some(y * self.columns + x)
    }

    /// Fill the quad swept between two ticks.
    ///
    /// Each row in the quad's vertical cell span is intersected with the
    /// four edges (left, right, this tick, previous tick); the cells
    /// between the extreme intersections, inclusive and clamped to the
    /// grid, are incremented.
    pub fn mark_coverage(
        &mut self,
        left: Point2,
        right: Point2,
        prev_left: Point2,
        prev_right: Point2,
    ) {
        if self.cells.is_empty() {
            return;
        }
        let l1 = self.world_to_cell(left);
        let r1 = self.world_to_cell(right);
        let l2 = self.world_to_cell(prev_left);
        let r2 = self.world_to_cell(prev_right);
        let edges = [(l1, l2), (r1, r2), (l1, r1), (l2, r2)];

        let max_row = i64::try_from(self.rows).unwrap_or(i64::MAX) - 1;
        let max_col = i64::try_from(self.columns).unwrap_or(i64::MAX) - 1;
        let min_y = l1.1.min(r1.1).min(l2.1).min(r2.1).max(0);
        let max_y = l1.1.max(r1.1).max(l2.1).max(r2.1).min(max_row);

        for y in min_y..=max_y {
            let mut span: Option<(i64, i64)> = None;
            for &(a, b) in &edges {
                span = scanline_span(a, b, y, span);
            }
            if let Some((lo, hi)) = span {
                self.increment_run(y, lo.max(0), hi.min(max_col));
            }
        }
    }

    fn increment_run(&mut self, y: i64, lo: i64, hi: i64) {
        if lo > hi {
            return;
        }
        let (Some(start), Some(end)) = (self.index(lo, y), self.index(hi, y)) else {
            return;
        };
        for cell in &mut self.cells[start..=end] {
            *cell = cell.saturating_add(1);
        }
    }

    /// Bucket the counters with the one-increment-per-pass scheme.
    #[must_use]
    pub fn histogram(&self) -> CoverageHistogram {
        CoverageHistogram::from_cells(&self.cells, OverlapBuckets::SINGLE_PASS)
    }
}

impl CoverageEngine for CoverageGrid {
    fn mark_quad(&mut self, quad: &CoverageQuad) {
        self.mark_coverage(quad.left, quad.right, quad.prev_left, quad.prev_right);
    }

    fn calculate_overlap(&self, worked_area: f64) -> Option<OverlapStats> {
        self.histogram().stats(worked_area)
    }

    fn reset(&mut self) {
        self.cells.fill(0);
    }
}

/// Widen `span` with the intersection of edge `a–b` and row `y`.
///
/// A horizontal edge on the row contributes both endpoints. Intersections
/// use integer arithmetic truncating towards zero.
fn scanline_span(
    (x1, y1): (i64, i64),
    (x2, y2): (i64, i64),
    y: i64,
    span: Option<(i64, i64)>,
) -> Option<(i64, i64)> {
    let on_row = (y1 <= y && y <= y2) || (y2 <= y && y <= y1);
    if !on_row {
        return span;
    }
    let (lo, hi) = if y1 == y2 {
        (x1.min(x2), x1.max(x2))
    } else {
        let x = x1.saturating_add(
            x2.saturating_sub(x1).saturating_mul(y.saturating_sub(y1)) / y2.saturating_sub(y1),
        );
        (x, x)
    };
    Some(span.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))))
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> i64 {
    // Saturating; NaN maps to 0.
    value as i64
}

fn cells_for(extent: f64, resolution: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cells = (extent / resolution).ceil().max(0.0) as usize;
    cells
}
