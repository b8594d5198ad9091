//! The guidance session: one object owning every engine component.
//!
//! A [`GuidanceSession`] is driven by exactly one [`tick`](GuidanceSession::tick)
//! per control period. Each tick runs, in order:
//!
//! 1. section control from a look-ahead sample of the coverage grid;
//! 2. contour recording, started and stopped by section actuation;
//! 3. zone patches and both coverage engines, fed by the mapping mask;
//! 4. a rate-limited guide-line rebuild;
//! 5. steering along the guide line.

use log::{info, trace};

use crate::boundary::{BoundaryQuery, FieldBoundary};
use crate::config::{EngineConfig, EngineError};
use crate::contour::{ContourEngine, GuideLineOutcome, StripOutcome};
use crate::coverage::{CoverageEngine, CoverageGrid, CoverageQuad};
use crate::diagnostics::SessionDiagnostics;
use crate::geometry::{Point2, Point3};
use crate::overlap::OverlapStats;
use crate::raster::{RasterStats, TriangleRasterizer};
use crate::section::{LookAheadBand, LookAheadRaster, SectionContext, SectionController, SectionSample};
use crate::steering::{GuidanceOutput, SteeringInput};
use crate::store::{StoreError, StripStore};
use crate::timer::TickRate;
use crate::zones::{ZoneEvent, ZoneRecorder, ZoneUpdate};

/// Vehicle state for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInputs {
    /// Pivot axle pose; the heading is the fix heading.
    pub pivot: Point3,
    /// Steer axle pose.
    pub steer_axle: Point3,
    /// Current speed, km/h.
    pub speed_kmh: f64,
    /// Smoothed speed, km/h.
    pub avg_speed_kmh: f64,
    pub autosteer_engaged: bool,
    pub in_u_turn: bool,
    /// Session run time, seconds.
    pub elapsed_secs: f64,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    pub mapping_mask: u64,
    pub actuation_mask: u64,
    /// Set on the tick recording stopped.
    pub strip: Option<StripOutcome>,
    pub guide: GuideLineOutcome,
    pub output: GuidanceOutput,
    /// Quads marked into both coverage engines.
    pub quads: Vec<CoverageQuad>,
    pub zone_events: Vec<ZoneEvent>,
}

/// Points whose motion is tracked between ticks: the tool's left edge,
/// every section centre, then the tool's right edge.
#[derive(Debug, Clone)]
struct Tracked {
    points: Vec<Point2>,
}

/// Owns configuration, boundary and every engine component.
#[derive(Debug, Clone)]
pub struct GuidanceSession {
    config: EngineConfig,
    boundary: Option<FieldBoundary>,
    rate: TickRate,
    contour: ContourEngine,
    sections: SectionController,
    zones: ZoneRecorder,
    grid: CoverageGrid,
    raster: TriangleRasterizer,
    ticks: u64,
    guided_ticks: u64,
    section_on_ticks: Vec<u64>,
    tracked: Option<Tracked>,
}

impl GuidanceSession {
    /// Validate `config` and size every component for `boundary`.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] raised by
    /// [`EngineConfig::validate`].
    pub fn new(config: EngineConfig, boundary: Option<FieldBoundary>) -> Result<Self, EngineError> {
        config.validate()?;
        let bounds = boundary.as_ref().map(FieldBoundary::bounds);
        let rate = TickRate::new(config.guidance.tick_rate_hz)?;
        let sections = SectionController::new(
            &config.tool,
            &config.vehicle,
            config.guidance.tick_rate_hz,
            config.coverage.look_ahead_pixels_per_metre,
        )?;
        info!(
            "[Session] {} sections over {:.2} m, {:?} steering at {} Hz{}",
            config.tool.section_count,
            config.tool.width,
            config.guidance.steering_law,
            rate.hz(),
            if boundary.is_some() { ", boundary loaded" } else { "" }
        );
        Ok(Self {
            grid: CoverageGrid::configure(bounds, &config.coverage),
            raster: TriangleRasterizer::configure(bounds, &config.coverage),
            contour: ContourEngine::new(config.guidance.rebuild_interval_secs),
            section_on_ticks: vec![0; config.tool.section_count],
            zones: ZoneRecorder::new(),
            sections,
            config,
            boundary,
            rate,
            ticks: 0,
            guided_ticks: 0,
            tracked: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn boundary(&self) -> Option<&FieldBoundary> {
        self.boundary.as_ref()
    }

    #[must_use]
    pub const fn contour(&self) -> &ContourEngine {
        &self.contour
    }

    pub const fn contour_mut(&mut self) -> &mut ContourEngine {
        &mut self.contour
    }

    #[must_use]
    pub const fn sections(&self) -> &SectionController {
        &self.sections
    }

    pub const fn sections_mut(&mut self) -> &mut SectionController {
        &mut self.sections
    }

    #[must_use]
    pub const fn zones(&self) -> &ZoneRecorder {
        &self.zones
    }

    #[must_use]
    pub const fn grid(&self) -> &CoverageGrid {
        &self.grid
    }

    #[must_use]
    pub const fn rasterizer(&self) -> &TriangleRasterizer {
        &self.raster
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one control tick.
    pub fn tick(&mut self, inputs: &TickInputs) -> TickReport {
        self.ticks += 1;
        let tool_cfg = &self.config.tool;
        let tool = inputs.pivot.shifted_right(tool_cfg.offset);
        let section_edges = tool_cfg.section_edges();
        let edges: Vec<(Point2, Point2)> = section_edges
            .iter()
            .map(|&(l, r)| (tool.shifted_right(l).position(), tool.shifted_right(r).position()))
            .collect();

        // Section control.
        let tracked = tracked_points(tool, tool_cfg.width, &section_edges);
        let speeds = self.point_speeds(&tracked, tool.heading, inputs.speed_kmh);
        let samples = self.section_samples(tool, &section_edges, &speeds);
        let ppm = self.config.coverage.look_ahead_pixels_per_metre;
        let rows = self.config.coverage.look_ahead_rows;
        let band = LookAheadBand::from_edge_speeds(
            speeds.first().copied().unwrap_or_default(),
            speeds.last().copied().unwrap_or_default(),
            tool_cfg,
            ppm,
            rows,
        );
        let look_ahead =
            LookAheadRaster::from_coverage(&self.grid, &self.boundary, tool, tool_cfg.width, ppm, rows);
        let ctx = SectionContext {
            avg_speed_kmh: inputs.avg_speed_kmh,
            has_boundary: self.boundary.has_boundary(),
            headland_control: tool_cfg.headland_section_control
                && self.boundary.as_ref().is_some_and(|b| b.headland().is_some()),
        };
        let mapping_mask = self.sections.update(&ctx, &look_ahead, &band, &samples);
        let actuation_mask = self.sections.actuation_mask();
        self.tracked = Some(Tracked { points: tracked });

        // Contour recording.
        let strip = if actuation_mask != 0 {
            if self.contour.is_recording() {
                self.contour.add_point(inputs.pivot, tool_cfg);
            } else {
                self.contour.start_strip(inputs.pivot, tool_cfg);
            }
            None
        } else if self.contour.is_recording() {
            Some(self.contour.stop_strip(inputs.pivot, tool_cfg))
        } else {
            None
        };

        // Patches and coverage.
        let update = self
            .zones
            .update(mapping_mask, tool_cfg.multi_colored_sections, &edges);
        self.mark(&update);

        // Guide line and steering.
        let guide = self
            .contour
            .build_guide_line(inputs.pivot, inputs.elapsed_secs, &self.config.tool);
        let input = SteeringInput {
            pivot: inputs.pivot,
            steer_axle: inputs.steer_axle,
            speed_kmh: inputs.speed_kmh,
            avg_speed_kmh: inputs.avg_speed_kmh,
            autosteer_engaged: inputs.autosteer_engaged,
            in_u_turn: inputs.in_u_turn,
            vehicle: &self.config.vehicle,
        };
        let output = self
            .contour
            .distance_from_contour_line(&self.config.guidance.steering_law, &input);
        trace!(
            "[Session] tick {}: xte {:.3} m, steer {:.2} deg",
            self.ticks, output.distance_from_line, output.steer_angle_deg
        );

        if output.is_valid() {
            self.guided_ticks += 1;
        }
        for (j, count) in self.section_on_ticks.iter_mut().enumerate() {
            if actuation_mask & (1 << j) != 0 {
                *count += 1;
            }
        }

        TickReport {
            tick: self.ticks,
            mapping_mask,
            actuation_mask,
            strip,
            guide,
            output,
            quads: update.quads,
            zone_events: update.events,
        }
    }

    /// End the session at `pivot`: close every patch and stop recording.
    pub fn finish(&mut self, pivot: Point3) -> (Option<StripOutcome>, ZoneUpdate) {
        let tool_cfg = &self.config.tool;
        let tool = pivot.shifted_right(tool_cfg.offset);
        let edges: Vec<(Point2, Point2)> = tool_cfg
            .section_edges()
            .iter()
            .map(|&(l, r)| (tool.shifted_right(l).position(), tool.shifted_right(r).position()))
            .collect();
        let update = self.zones.close_all(&edges);
        self.mark(&update);
        let strip = self
            .contour
            .is_recording()
            .then(|| self.contour.stop_strip(pivot, &self.config.tool));
        self.sections.reset();
        self.tracked = None;
        (strip, update)
    }

    /// Toggle the contour lock. Returns whether it changed.
    pub fn toggle_lock(&mut self) -> bool {
        self.contour.toggle_lock()
    }

    /// Add boundary-following strips for `pass`. Returns how many were
    /// added; zero without a boundary.
    pub fn build_boundary_contours(&mut self, pass: u32, spacing_cm: i32) -> usize {
        self.boundary.as_ref().map_or(0, |boundary| {
            self.contour
                .build_boundary_contours(boundary, pass, spacing_cm, &self.config.tool)
        })
    }

    /// Overlap statistics from the grid and the rasterizer.
    #[must_use]
    pub fn calculate_overlap(&self) -> (Option<OverlapStats>, Option<RasterStats>) {
        let worked = self.zones.worked_area();
        (
            CoverageEngine::calculate_overlap(&self.grid, worked),
            self.raster.calculate_overlap(worked),
        )
    }

    #[must_use]
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let (grid, raster) = self.calculate_overlap();
        let strips = self.contour.strips();
        SessionDiagnostics {
            ticks: self.ticks,
            strips: strips.len(),
            strip_points: strips.iter().map(|s| s.len()).sum(),
            recording: self.contour.is_recording(),
            locked: self.contour.is_locked(),
            guide_points: self.contour.guide_line().len(),
            worked_area: self.zones.worked_area(),
            patches: self.zones.completed_patches().len(),
            field_area: self.boundary.as_ref().map(FieldBoundary::area),
            grid,
            raster,
            fill_rule: self.raster.fill_rule(),
            guided_ticks: self.guided_ticks,
            section_on_ticks: self.section_on_ticks.clone(),
        }
    }

    /// Replace the sealed strips with those in `store`. Returns how many
    /// were loaded.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StoreError`].
    pub fn load_strips<S: StripStore + ?Sized>(&mut self, store: &S) -> Result<usize, StoreError> {
        let strips = store.load_strips()?;
        let count = strips.len();
        self.contour.load_strips(strips);
        Ok(count)
    }

    /// Save the sealed strips to `store`.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StoreError`].
    pub fn save_strips<S: StripStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        store.save_strips(self.contour.strips())
    }

    /// Clear all recorded state, keeping configuration and boundary.
    pub fn reset(&mut self) {
        self.contour.reset();
        self.sections.reset();
        self.zones.reset();
        CoverageEngine::reset(&mut self.grid);
        self.raster.clear();
        self.ticks = 0;
        self.guided_ticks = 0;
        self.section_on_ticks.fill(0);
        self.tracked = None;
        info!("[Session] reset");
    }

    fn mark(&mut self, update: &ZoneUpdate) {
        for quad in &update.quads {
            self.grid.mark_quad(quad);
            self.raster.mark_quad(quad);
        }
    }

    /// Forward speed of each tracked point, m/s: displacement since the
    /// last tick projected on the heading. Without a previous tick every
    /// point moves at the vehicle speed.
    fn point_speeds(&self, points: &[Point2], heading: f64, speed_kmh: f64) -> Vec<f64> {
        let previous = self
            .tracked
            .as_ref()
            .map(|t| t.points.as_slice())
            .filter(|p| p.len() == points.len());
        let Some(previous) = previous else {
            return vec![speed_kmh / 3.6; points.len()];
        };
        let (sin, cos) = heading.sin_cos();
        let hz = self.rate.hz();
        points
            .iter()
            .zip(previous)
            .map(|(now, before)| {
                let de = now.easting - before.easting;
                let dn = now.northing - before.northing;
                de.mul_add(sin, dn * cos) * hz
            })
            .collect()
    }

    fn section_samples(
        &self,
        tool: Point3,
        section_edges: &[(f64, f64)],
        speeds: &[f64],
    ) -> Vec<SectionSample> {
        let look_on_secs = self.config.tool.look_ahead_on_secs;
        section_edges
            .iter()
            .enumerate()
            .map(|(j, &(l, r))| {
                let speed_ms = speeds.get(j + 1).copied().unwrap_or_default();
                let left = tool.shifted_right(l);
                let right = tool.shifted_right(r);
                let in_boundary = self.boundary.is_inside_field(left.position())
                    && self.boundary.is_inside_field(right.position());
                let reach = speed_ms.max(0.0) * look_on_secs;
                let look_on_in_headland = self.boundary.is_in_headland(left.ahead(reach))
                    && self.boundary.is_in_headland(right.ahead(reach));
                SectionSample {
                    in_boundary,
                    look_on_in_headland,
                    speed_ms,
                }
            })
            .collect()
    }
}

/// Tool left edge, section centres, tool right edge.
fn tracked_points(tool: Point3, width: f64, section_edges: &[(f64, f64)]) -> Vec<Point2> {
    let half = width * 0.5;
    std::iter::once(-half)
        .chain(section_edges.iter().map(|&(l, r)| (l + r) * 0.5))
        .chain(std::iter::once(half))
        .map(|offset| tool.shifted_right(offset).position())
        .collect()
}
