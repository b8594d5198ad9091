//! Engine configuration and the engine error type.
//!
//! Every tunable lives in a serde-serializable struct whose `Default`
//! matches the shipped settings of the field computer. The session
//! validates an [`EngineConfig`] once at construction; nothing is
//! re-validated per tick.

use serde::{Deserialize, Serialize};

use crate::raster::FillRule;
use crate::steering::SteeringLawKind;

/// Maximum number of sections; the mapping bitmask is 64 bits wide.
pub const MAX_SECTIONS: usize = 64;

/// Errors raised for programmer or configuration mistakes.
///
/// Expected geometric edge cases (no adjacent pass, degenerate segment,
/// too few guide-line points) are never reported through this type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A configuration value is out of its valid range.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// More sections than the mapping bitmask can hold.
    #[error("{count} sections configured, at most {max} are supported")]
    TooManySections {
        /// Requested number of sections.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// A boundary ring was built from no points.
    #[error("polygon has no points")]
    EmptyPolygon,

    /// A boundary ring has fewer than three points.
    #[error("polygon needs at least 3 points, got {0}")]
    DegeneratePolygon(usize),
}

/// Vehicle geometry and steering tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Distance between the pivot and steer axles, metres.
    pub wheelbase: f64,

    /// Largest steering angle the vehicle can command, degrees.
    pub max_steer_angle_deg: f64,

    /// Largest yaw rate pure pursuit may request, radians per second.
    pub max_angular_velocity: f64,

    /// Below this average speed every auto section requests off, km/h.
    pub slow_speed_cutoff_kmh: f64,

    /// Stanley cross-track gain.
    pub stanley_distance_gain: f64,

    /// Stanley heading-error gain.
    pub stanley_heading_gain: f64,

    /// Pure-pursuit integral gain. Zero disables the integrator.
    pub pure_pursuit_integral_gain: f64,

    /// Look-ahead distance used while acquiring the line, metres.
    pub goal_point_look_ahead: f64,

    /// Look-ahead distance used while holding the line, metres.
    pub goal_point_look_ahead_hold: f64,

    /// Multiplier on the speed-dependent look-ahead term.
    pub goal_point_look_ahead_mult: f64,

    /// Look-ahead never drops below this, metres.
    pub look_ahead_minimum: f64,
}

impl VehicleConfig {
    pub const DEFAULT_WHEELBASE: f64 = 3.3;
    pub const DEFAULT_MAX_STEER_ANGLE_DEG: f64 = 30.0;
    pub const DEFAULT_MAX_ANGULAR_VELOCITY: f64 = 0.64;
    pub const DEFAULT_SLOW_SPEED_CUTOFF_KMH: f64 = 0.5;
    pub const DEFAULT_STANLEY_DISTANCE_GAIN: f64 = 1.0;
    pub const DEFAULT_STANLEY_HEADING_GAIN: f64 = 1.0;
    pub const DEFAULT_PURE_PURSUIT_INTEGRAL_GAIN: f64 = 0.0;
    pub const DEFAULT_GOAL_POINT_LOOK_AHEAD: f64 = 3.0;
    pub const DEFAULT_GOAL_POINT_LOOK_AHEAD_HOLD: f64 = 3.0;
    pub const DEFAULT_GOAL_POINT_LOOK_AHEAD_MULT: f64 = 1.5;
    pub const DEFAULT_LOOK_AHEAD_MINIMUM: f64 = 2.0;

    /// Cross-track error at or below which the hold distance applies.
    const HOLD_BAND: f64 = 0.1;

    /// Cross-track error at or above which the acquire distance applies.
    const ACQUIRE_BAND: f64 = 0.4;

    /// Speed-dependent pure-pursuit look-ahead distance.
    ///
    /// The base distance blends linearly from the hold distance (at
    /// |cross-track| ≤ 0.1 m) to the acquire distance (at ≥ 0.4 m); the
    /// speed term `avg_speed_kmh * 0.05 * mult` is added on top, and the
    /// result is clamped below by [`look_ahead_minimum`](Self::look_ahead_minimum).
    #[must_use]
    pub fn goal_point_distance(&self, avg_speed_kmh: f64, cross_track: f64) -> f64 {
        let xte = cross_track.abs();
        let base = if xte <= Self::HOLD_BAND {
            self.goal_point_look_ahead_hold
        } else if xte >= Self::ACQUIRE_BAND {
            self.goal_point_look_ahead
        } else {
            let t = (xte - Self::HOLD_BAND) / (Self::ACQUIRE_BAND - Self::HOLD_BAND);
            t.mul_add(
                self.goal_point_look_ahead - self.goal_point_look_ahead_hold,
                self.goal_point_look_ahead_hold,
            )
        };
        let speed_term = avg_speed_kmh.abs() * 0.05 * self.goal_point_look_ahead_mult;
        (base + speed_term).max(self.look_ahead_minimum)
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            wheelbase: Self::DEFAULT_WHEELBASE,
            max_steer_angle_deg: Self::DEFAULT_MAX_STEER_ANGLE_DEG,
            max_angular_velocity: Self::DEFAULT_MAX_ANGULAR_VELOCITY,
            slow_speed_cutoff_kmh: Self::DEFAULT_SLOW_SPEED_CUTOFF_KMH,
            stanley_distance_gain: Self::DEFAULT_STANLEY_DISTANCE_GAIN,
            stanley_heading_gain: Self::DEFAULT_STANLEY_HEADING_GAIN,
            pure_pursuit_integral_gain: Self::DEFAULT_PURE_PURSUIT_INTEGRAL_GAIN,
            goal_point_look_ahead: Self::DEFAULT_GOAL_POINT_LOOK_AHEAD,
            goal_point_look_ahead_hold: Self::DEFAULT_GOAL_POINT_LOOK_AHEAD_HOLD,
            goal_point_look_ahead_mult: Self::DEFAULT_GOAL_POINT_LOOK_AHEAD_MULT,
            look_ahead_minimum: Self::DEFAULT_LOOK_AHEAD_MINIMUM,
        }
    }
}

/// Implement geometry and section timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Full working width, metres.
    pub width: f64,

    /// Intended overlap between adjacent passes, metres.
    pub overlap: f64,

    /// Lateral offset of the tool centreline from the pivot; positive
    /// is to the right, metres.
    pub offset: f64,

    /// Number of equally wide sections across the tool.
    pub section_count: usize,

    /// Delay between an off request and physical shut-off, seconds.
    pub turn_off_delay_secs: f64,

    /// How far ahead in time the on-band of the look-ahead reaches, seconds.
    pub look_ahead_on_secs: f64,

    /// How far ahead in time the off-band of the look-ahead reaches, seconds.
    pub look_ahead_off_secs: f64,

    /// Percentage of the look-ahead band that must be covered before a
    /// section turns off.
    pub min_coverage_percent: u32,

    /// Record every section as its own patch instead of merging runs.
    pub multi_colored_sections: bool,

    /// Let the headland ring drive section on/off decisions.
    pub headland_section_control: bool,
}

impl ToolConfig {
    pub const DEFAULT_WIDTH: f64 = 4.0;
    pub const DEFAULT_OVERLAP: f64 = 0.0;
    pub const DEFAULT_OFFSET: f64 = 0.0;
    pub const DEFAULT_SECTION_COUNT: usize = 3;
    pub const DEFAULT_TURN_OFF_DELAY_SECS: f64 = 0.0;
    pub const DEFAULT_LOOK_AHEAD_ON_SECS: f64 = 1.0;
    pub const DEFAULT_LOOK_AHEAD_OFF_SECS: f64 = 0.5;
    pub const DEFAULT_MIN_COVERAGE_PERCENT: u32 = 100;

    /// Width actually added per pass: `width - overlap`.
    #[must_use]
    pub fn effective_width(&self) -> f64 {
        self.width - self.overlap
    }

    /// Left and right edge offsets of each section from the tool
    /// centreline, left to right. Negative is left.
    #[must_use]
    pub fn section_edges(&self) -> Vec<(f64, f64)> {
        #[allow(clippy::cast_precision_loss)]
        let section_width = self.width / self.section_count.max(1) as f64;
        let half = self.width * 0.5;
        (0..self.section_count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let left = (i as f64).mul_add(section_width, -half);
                (left, left + section_width)
            })
            .collect()
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            overlap: Self::DEFAULT_OVERLAP,
            offset: Self::DEFAULT_OFFSET,
            section_count: Self::DEFAULT_SECTION_COUNT,
            turn_off_delay_secs: Self::DEFAULT_TURN_OFF_DELAY_SECS,
            look_ahead_on_secs: Self::DEFAULT_LOOK_AHEAD_ON_SECS,
            look_ahead_off_secs: Self::DEFAULT_LOOK_AHEAD_OFF_SECS,
            min_coverage_percent: Self::DEFAULT_MIN_COVERAGE_PERCENT,
            multi_colored_sections: false,
            headland_section_control: false,
        }
    }
}

/// Contour guidance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Which steering law turns cross-track error into a steer angle.
    pub steering_law: SteeringLawKind,

    /// Minimum run time between two guide-line rebuilds, seconds.
    pub rebuild_interval_secs: f64,

    /// Control loop rate, ticks per second.
    pub tick_rate_hz: f64,
}

impl GuidanceConfig {
    pub const DEFAULT_REBUILD_INTERVAL_SECS: f64 = 3.0;
    pub const DEFAULT_TICK_RATE_HZ: f64 = 10.0;
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            steering_law: SteeringLawKind::default(),
            rebuild_interval_secs: Self::DEFAULT_REBUILD_INTERVAL_SECS,
            tick_rate_hz: Self::DEFAULT_TICK_RATE_HZ,
        }
    }
}

/// Coverage tracking resolution and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Coverage grid cell edge length, metres.
    pub grid_resolution: f64,

    /// Margin added around the field bounds, metres.
    pub padding: f64,

    /// Largest grid width in cells.
    pub max_columns: usize,

    /// Largest grid height in cells.
    pub max_rows: usize,

    /// Triangle rasterizer resolution, pixels per metre.
    pub raster_pixels_per_metre: f64,

    /// Span rule the triangle rasterizer fills with.
    pub fill_rule: FillRule,

    /// Look-ahead raster resolution, pixels per metre.
    pub look_ahead_pixels_per_metre: f64,

    /// Look-ahead raster depth, rows.
    pub look_ahead_rows: usize,
}

impl CoverageConfig {
    pub const DEFAULT_GRID_RESOLUTION: f64 = 0.1;
    pub const DEFAULT_PADDING: f64 = 10.0;
    pub const DEFAULT_MAX_COLUMNS: usize = 2000;
    pub const DEFAULT_MAX_ROWS: usize = 4000;
    pub const DEFAULT_RASTER_PIXELS_PER_METRE: f64 = 10.0;
    pub const DEFAULT_LOOK_AHEAD_PIXELS_PER_METRE: f64 = 10.0;
    pub const DEFAULT_LOOK_AHEAD_ROWS: usize = 160;
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            grid_resolution: Self::DEFAULT_GRID_RESOLUTION,
            padding: Self::DEFAULT_PADDING,
            max_columns: Self::DEFAULT_MAX_COLUMNS,
            max_rows: Self::DEFAULT_MAX_ROWS,
            raster_pixels_per_metre: Self::DEFAULT_RASTER_PIXELS_PER_METRE,
            fill_rule: FillRule::default(),
            look_ahead_pixels_per_metre: Self::DEFAULT_LOOK_AHEAD_PIXELS_PER_METRE,
            look_ahead_rows: Self::DEFAULT_LOOK_AHEAD_ROWS,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub vehicle: VehicleConfig,
    pub tool: ToolConfig,
    pub guidance: GuidanceConfig,
    pub coverage: CoverageConfig,
}

impl EngineConfig {
    /// Check every value the engine divides by or indexes with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TooManySections`] when more than
    /// [`MAX_SECTIONS`] sections are configured, and
    /// [`EngineError::InvalidConfig`] for any other out-of-range value.
    pub fn validate(&self) -> Result<(), EngineError> {
        let v = &self.vehicle;
        let t = &self.tool;
        let g = &self.guidance;
        let c = &self.coverage;

        require_positive("vehicle.wheelbase", v.wheelbase)?;
        require_positive("vehicle.max_steer_angle_deg", v.max_steer_angle_deg)?;
        require_positive("vehicle.max_angular_velocity", v.max_angular_velocity)?;
        require_non_negative("vehicle.slow_speed_cutoff_kmh", v.slow_speed_cutoff_kmh)?;
        require_non_negative("vehicle.look_ahead_minimum", v.look_ahead_minimum)?;

        require_positive("tool.width", t.width)?;
        require_non_negative("tool.overlap", t.overlap)?;
        if !t.offset.is_finite() {
            return Err(EngineError::InvalidConfig(
                "tool.offset must be finite".to_owned(),
            ));
        }
        if t.effective_width() <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "tool.width ({}) must exceed tool.overlap ({})",
                t.width, t.overlap
            )));
        }
        if t.section_count == 0 {
            return Err(EngineError::InvalidConfig(
                "tool.section_count must be at least 1".to_owned(),
            ));
        }
        if t.section_count > MAX_SECTIONS {
            return Err(EngineError::TooManySections {
                count: t.section_count,
                max: MAX_SECTIONS,
            });
        }
        require_non_negative("tool.turn_off_delay_secs", t.turn_off_delay_secs)?;
        require_non_negative("tool.look_ahead_on_secs", t.look_ahead_on_secs)?;
        require_non_negative("tool.look_ahead_off_secs", t.look_ahead_off_secs)?;
        if t.min_coverage_percent > 100 {
            return Err(EngineError::InvalidConfig(format!(
                "tool.min_coverage_percent ({}) must be at most 100",
                t.min_coverage_percent
            )));
        }

        require_positive("guidance.tick_rate_hz", g.tick_rate_hz)?;
        require_non_negative("guidance.rebuild_interval_secs", g.rebuild_interval_secs)?;

        require_positive("coverage.grid_resolution", c.grid_resolution)?;
        require_non_negative("coverage.padding", c.padding)?;
        require_positive("coverage.raster_pixels_per_metre", c.raster_pixels_per_metre)?;
        require_positive(
            "coverage.look_ahead_pixels_per_metre",
            c.look_ahead_pixels_per_metre,
        )?;
        if c.max_columns == 0 || c.max_rows == 0 || c.look_ahead_rows == 0 {
            return Err(EngineError::InvalidConfig(
                "coverage grid and look-ahead dimensions must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be non-negative and finite, got {value}"
        )))
    }
}
