//! Section control: per-section on/off and mapping decisions.
//!
//! Every tick each section first derives an on request from its button
//! mode, the vehicle speed and, in auto mode, a look-ahead sample of
//! the coverage raster ahead of the tool. Boundary and headland checks
//! can override the request. Requests then drive two independent
//! timelines:
//!
//! - actuation (`is_on`), delayed on the way off by the turn-off delay;
//! - mapping (`is_mapping_on`), delayed by the look-ahead on and off
//!   settings so recorded coverage matches where product lands.
//!
//! All delays are [`TicksRemaining`] countdowns decremented once per tick.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryQuery;
use crate::config::{EngineError, MAX_SECTIONS, ToolConfig, VehicleConfig};
use crate::coverage::CoverageGrid;
use crate::geometry::Point3;
use crate::timer::{TickRate, TicksRemaining};

/// Operator button state of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionMode {
    /// Always off.
    Off,
    /// Decided by coverage look-ahead.
    #[default]
    Auto,
    /// Always on, even when stopped.
    On,
}

/// One section of the implement.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Button state.
    pub mode: SectionMode,
    left: f64,
    right: f64,
    on_request: bool,
    is_on: bool,
    is_mapping_on: bool,
    off_timer: TicksRemaining,
    mapping_on_timer: TicksRemaining,
    mapping_off_timer: TicksRemaining,
}

impl Section {
    /// A section spanning `left..right` metres from the tool centreline.
    #[must_use]
    pub fn new(left: f64, right: f64) -> Self {
        Self {
            mode: SectionMode::default(),
            left,
            right,
            on_request: false,
            is_on: false,
            is_mapping_on: false,
            off_timer: TicksRemaining::EXPIRED,
            mapping_on_timer: TicksRemaining::EXPIRED,
            mapping_off_timer: TicksRemaining::EXPIRED,
        }
    }

    /// Left edge offset from the tool centreline, metres.
    #[must_use]
    pub const fn left(&self) -> f64 {
        self.left
    }

    /// Right edge offset from the tool centreline, metres.
    #[must_use]
    pub const fn right(&self) -> f64 {
        self.right
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Whether the last update requested the section on.
    #[must_use]
    pub const fn on_request(&self) -> bool {
        self.on_request
    }

    /// Physical actuation state.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.is_on
    }

    /// Whether coverage is being recorded for this section.
    #[must_use]
    pub const fn is_mapping_on(&self) -> bool {
        self.is_mapping_on
    }

    /// Ticks left before an off request switches actuation off.
    #[must_use]
    pub const fn off_timer(&self) -> TicksRemaining {
        self.off_timer
    }

    fn clear_timers(&mut self) {
        self.off_timer.clear();
        self.mapping_on_timer.clear();
        self.mapping_off_timer.clear();
    }
}

/// Coverage raster sampled in the tool frame.
///
/// Column 0 is the left tool edge, row 0 the tool line; rows grow ahead
/// of the tool. A zero cell is uncovered ground the tool should apply
/// to; any other value counts as covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookAheadRaster {
    columns: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl LookAheadRaster {
    /// Ground not yet covered.
    pub const UNCOVERED: u8 = 0;
    /// Ground already covered, or outside the field.
    pub const COVERED: u8 = 1;
    /// A headland line crossing.
    pub const HEADLAND_EDGE: u8 = 250;

    /// An all-uncovered raster.
    #[must_use]
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            cells: vec![Self::UNCOVERED; columns * rows],
        }
    }

    /// Sample `grid` ahead of a tool of `width` metres centred on `tool`.
    ///
    /// Cells are `pixels_per_metre` apart in both directions. Ground
    /// outside the field reads as covered. When a headland is loaded, a
    /// cell where the headland state differs from the cell one row
    /// closer to the tool is marked [`HEADLAND_EDGE`](Self::HEADLAND_EDGE).
    #[must_use]
    pub fn from_coverage<B: BoundaryQuery + ?Sized>(
        grid: &CoverageGrid,
        boundary: &B,
        tool: Point3,
        width: f64,
        pixels_per_metre: f64,
        rows: usize,
    ) -> Self {
        let columns = pixels_for(width, pixels_per_metre);
        let mut raster = Self::new(columns, rows);
        let step = pixels_per_metre.recip();
        for column in 0..columns {
            #[allow(clippy::cast_precision_loss)]
            let lateral = (column as f64 + 0.5).mul_add(step, -width * 0.5);
            let base = tool.shifted_right(lateral);
            let mut was_headland = boundary.is_in_headland(base.position());
            for row in 0..rows {
                #[allow(clippy::cast_precision_loss)]
                let p = base.ahead(row as f64 * step);
                let in_headland = boundary.is_in_headland(p);
                let value = if row > 0 && in_headland != was_headland {
                    Self::HEADLAND_EDGE
                } else if !boundary.is_inside_field(p) || grid.coverage_at(p) > 0 {
                    Self::COVERED
                } else {
                    Self::UNCOVERED
                };
                was_headland = in_headland;
                raster.cells[row * columns + column] = value;
            }
        }
        raster
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Cell value; out-of-range cells read as covered.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> u8 {
        if row >= self.rows || column >= self.columns {
            return Self::COVERED;
        }
        self.cells[row * self.columns + column]
    }

    /// Overwrite one cell. Out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, column: usize, value: u8) {
        if row < self.rows && column < self.columns {
            self.cells[row * self.columns + column] = value;
        }
    }
}

/// Rows ahead of the tool bounding the look-ahead band, at the left and
/// right tool edges. The band runs from the off rows to the on rows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LookAheadBand {
    pub on_left: f64,
    pub on_right: f64,
    pub off_left: f64,
    pub off_right: f64,
}

impl LookAheadBand {
    /// Band for tool edges moving at `left_ms` and `right_ms` metres per
    /// second: each edge looks `speed * look_ahead_secs` metres ahead,
    /// converted to rows and capped at `max_rows - 1`.
    #[must_use]
    pub fn from_edge_speeds(
        left_ms: f64,
        right_ms: f64,
        tool: &ToolConfig,
        pixels_per_metre: f64,
        max_rows: usize,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let cap = max_rows.saturating_sub(1) as f64;
        let rows = |speed: f64, secs: f64| (speed * secs * pixels_per_metre).clamp(0.0, cap);
        Self {
            on_left: rows(left_ms, tool.look_ahead_on_secs),
            on_right: rows(right_ms, tool.look_ahead_on_secs),
            off_left: rows(left_ms, tool.look_ahead_off_secs),
            off_right: rows(right_ms, tool.look_ahead_off_secs),
        }
    }
}

/// Per-section facts gathered by the caller each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionSample {
    /// Whether the section is inside the field.
    pub in_boundary: bool,
    /// Whether both look-on points are in the headland.
    pub look_on_in_headland: bool,
    /// Forward speed of the section centre, m/s. Negative when reversing.
    pub speed_ms: f64,
}

impl Default for SectionSample {
    fn default() -> Self {
        Self {
            in_boundary: true,
            look_on_in_headland: false,
            speed_ms: 0.0,
        }
    }
}

/// Vehicle-wide facts for one section update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionContext {
    pub avg_speed_kmh: f64,
    /// Whether a field boundary is loaded.
    pub has_boundary: bool,
    /// Whether headland-based section control is enabled and a headland
    /// is loaded.
    pub headland_control: bool,
}

/// Raster columns covered by one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnSpan {
    start: usize,
    end: usize,
}

/// Drives every section through one tick at a time.
#[derive(Debug, Clone)]
pub struct SectionController {
    sections: Vec<Section>,
    spans: Vec<ColumnSpan>,
    raster_width: usize,
    rate: TickRate,
    turn_off_delay_secs: f64,
    look_ahead_on_secs: f64,
    look_ahead_off_secs: f64,
    min_coverage_percent: u32,
    slow_speed_cutoff_kmh: f64,
}

impl SectionController {
    /// Sections for `tool`, sampled from a look-ahead raster at
    /// `pixels_per_metre`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TooManySections`] for more than
    /// [`MAX_SECTIONS`] sections and [`EngineError::InvalidConfig`] for a
    /// non-positive tick rate or a minimum coverage above 100 %.
    pub fn new(
        tool: &ToolConfig,
        vehicle: &VehicleConfig,
        tick_rate_hz: f64,
        pixels_per_metre: f64,
    ) -> Result<Self, EngineError> {
        if tool.section_count > MAX_SECTIONS {
            return Err(EngineError::TooManySections {
                count: tool.section_count,
                max: MAX_SECTIONS,
            });
        }
        if tool.min_coverage_percent > 100 {
            return Err(EngineError::InvalidConfig(format!(
                "tool.min_coverage_percent ({}) must be at most 100",
                tool.min_coverage_percent
            )));
        }
        let rate = TickRate::new(tick_rate_hz)?;
        let edges = tool.section_edges();
        let raster_width = pixels_for(tool.width, pixels_per_metre);
        let first_left = edges.first().map_or(0.0, |&(left, _)| left);
        let spans = edges
            .iter()
            .map(|&(left, right)| {
                let start = pixels_for(left - first_left, pixels_per_metre);
                let width = pixels_for(right - left, pixels_per_metre).max(1);
                let end = (start + width - 1).min(raster_width.saturating_sub(1));
                ColumnSpan { start, end }
            })
            .collect();
        Ok(Self {
            sections: edges
                .into_iter()
                .map(|(left, right)| Section::new(left, right))
                .collect(),
            spans,
            raster_width,
            rate,
            turn_off_delay_secs: tool.turn_off_delay_secs,
            look_ahead_on_secs: tool.look_ahead_on_secs,
            look_ahead_off_secs: tool.look_ahead_off_secs,
            min_coverage_percent: tool.min_coverage_percent,
            slow_speed_cutoff_kmh: vehicle.slow_speed_cutoff_kmh,
        })
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Set the button mode of section `index`. Out-of-range indices are
    /// ignored.
    pub fn set_mode(&mut self, index: usize, mode: SectionMode) {
        if let Some(section) = self.sections.get_mut(index) {
            section.mode = mode;
        }
    }

    /// Set every section's button mode.
    pub fn set_all_modes(&mut self, mode: SectionMode) {
        for section in &mut self.sections {
            section.mode = mode;
        }
    }

    /// Switch every section off and clear its timers, keeping modes.
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            *section = Section {
                mode: section.mode,
                ..Section::new(section.left, section.right)
            };
        }
    }

    /// Bit `j` set when section `j` is mapping.
    #[must_use]
    pub fn mapping_mask(&self) -> u64 {
        mask_of(&self.sections, Section::is_mapping_on)
    }

    /// Bit `j` set when section `j` is actuated.
    #[must_use]
    pub fn actuation_mask(&self) -> u64 {
        mask_of(&self.sections, Section::is_on)
    }

    /// Run one tick and return the new mapping mask.
    ///
    /// `samples` holds one entry per section; missing entries count as
    /// in-boundary, not in headland, stationary.
    pub fn update(
        &mut self,
        ctx: &SectionContext,
        raster: &LookAheadRaster,
        band: &LookAheadBand,
        samples: &[SectionSample],
    ) -> u64 {
        for j in 0..self.sections.len() {
            let sample = samples.get(j).copied().unwrap_or_default();
            let request = self.request(j, ctx, raster, band, &sample);
            let section = &mut self.sections[j];
            if request != section.on_request {
                log::debug!(
                    "[Section] {j} request {}",
                    if request { "on" } else { "off" }
                );
            }
            section.on_request = request;
        }

        let rate = self.rate;
        let delay = self.turn_off_delay_secs;
        let mapping_on_ticks = rate.ticks_floor(self.look_ahead_on_secs).saturating_sub(1);
        let mapping_off_ticks = if self.look_ahead_off_secs > 0.0 {
            Some(rate.ticks_floor(self.look_ahead_off_secs) + 4)
        } else if delay > 0.0 {
            Some(rate.ticks_floor(delay))
        } else {
            None
        };

        for section in &mut self.sections {
            advance_actuation(section, rate, delay);
            advance_mapping(section, mapping_on_ticks, mapping_off_ticks);
        }
        self.mapping_mask()
    }

    /// On request for section `j` before timers.
    fn request(
        &mut self,
        j: usize,
        ctx: &SectionContext,
        raster: &LookAheadRaster,
        band: &LookAheadBand,
        sample: &SectionSample,
    ) -> bool {
        let mode = self.sections[j].mode;
        let stopped = ctx.avg_speed_kmh < self.slow_speed_cutoff_kmh || sample.speed_ms < 0.0;
        match mode {
            SectionMode::On => return true,
            SectionMode::Off => return false,
            SectionMode::Auto if stopped => return false,
            SectionMode::Auto => {}
        }

        let span = self.spans[j];
        let (tagged, total) = self.sample_band(raster, band, span, |v| {
            v == LookAheadRaster::UNCOVERED
        });
        let mut required = tagged * 100 / total > 100 - u64::from(self.min_coverage_percent);

        if ctx.has_boundary {
            if !sample.in_boundary {
                self.sections[j].clear_timers();
                return false;
            }
            if ctx.headland_control {
                let (edges, _) = self.sample_band(raster, band, span, |v| {
                    v == LookAheadRaster::HEADLAND_EDGE
                });
                let headland_ahead = edges > 0;
                if required && sample.look_on_in_headland && !headland_ahead {
                    required = false;
                }
            }
        }
        required
    }

    /// Count band cells matching `hit` over `span`, and the sampled total
    /// (which starts at one).
    fn sample_band(
        &self,
        raster: &LookAheadRaster,
        band: &LookAheadBand,
        span: ColumnSpan,
        hit: impl Fn(u8) -> bool,
    ) -> (u64, u64) {
        #[allow(clippy::cast_precision_loss)]
        let width = self.raster_width.max(1) as f64;
        let slope_on = (band.on_right - band.on_left) / width;
        let slope_off = (band.off_right - band.off_left) / width;
        let mut total = 1;
        let mut tagged = 0;
        for pos in span.start..=span.end {
            #[allow(clippy::cast_precision_loss)]
            let x = pos as f64;
            let first = row_of(slope_off.mul_add(x, band.off_left));
            let last = row_of(slope_on.mul_add(x, band.on_left));
            for row in first..=last {
                total += 1;
                if hit(raster.get(row, pos)) {
                    tagged += 1;
                }
            }
        }
        (tagged, total)
    }
}

/// Actuation: on immediately, off after the turn-off delay.
fn advance_actuation(section: &mut Section, rate: TickRate, delay_secs: f64) {
    if section.on_request {
        section.is_on = true;
    }
    if delay_secs > 0.0 {
        if section.on_request {
            section.off_timer = TicksRemaining::from_secs(rate, delay_secs);
        } else if section.off_timer.is_expired() {
            section.is_on = false;
        } else {
            section.off_timer.tick();
        }
    } else if !section.on_request {
        section.is_on = false;
    }
}

/// Mapping: on after the look-ahead-on countdown, off after the
/// look-ahead-off (or turn-off delay) countdown.
fn advance_mapping(section: &mut Section, on_ticks: u32, off_ticks: Option<u32>) {
    let on_request = section.on_request;
    if on_request && !section.is_mapping_on && section.mapping_on_timer.is_expired() {
        section.mapping_on_timer = TicksRemaining::new(on_ticks);
    } else if on_request && section.is_mapping_on && section.mapping_off_timer.get() > 1 {
        section.mapping_off_timer.clear();
        section.mapping_on_timer = TicksRemaining::new(on_ticks);
    }

    match off_ticks {
        Some(ticks) => {
            if !on_request && section.is_mapping_on && section.mapping_off_timer.is_expired() {
                section.mapping_off_timer = TicksRemaining::new(ticks);
            }
        }
        None => section.mapping_off_timer.clear(),
    }

    if on_request {
        section.mapping_off_timer.clear();
        if section.mapping_on_timer.get() > 1 {
            section.mapping_on_timer.tick();
        } else {
            section.is_mapping_on = true;
        }
    } else {
        section.mapping_on_timer.clear();
        if section.mapping_off_timer.get() > 1 {
            section.mapping_off_timer.tick();
        } else {
            section.is_mapping_on = false;
        }
    }
}

fn mask_of(sections: &[Section], flag: impl Fn(&Section) -> bool) -> u64 {
    sections
        .iter()
        .enumerate()
        .filter(|(_, s)| flag(s))
        .fold(0, |mask, (j, _)| mask | (1 << j))
}

/// Truncate a fractional row, clamping negatives to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_of(value: f64) -> usize {
    value.max(0.0) as usize
}

/// `metres * pixels_per_metre`, rounded half away from zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixels_for(metres: f64, pixels_per_metre: f64) -> usize {
    (metres * pixels_per_metre).round().max(0.0) as usize
}
