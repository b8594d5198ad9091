//! Back-and-forth passes over a rectangular field.
//!
//! The vehicle is a kinematic bicycle: each tick it turns by
//! `v · tan(δ) / wheelbase · dt` and moves `v · dt` along the new
//! heading. With guidance it steers by the engine's command; without,
//! it holds the pass heading.

use log::info;
use swath_core::geometry::normalize_positive;
use swath_core::{
    EngineError, FieldBoundary, GuidanceSession, Point2, Point3, Polygon, StripOutcome, TickInputs,
};

/// Seconds spent turning between passes.
const TURN_SECS: f64 = 8.0;

/// Distance kept from the fence at both ends of a pass, metres.
const END_MARGIN_M: f64 = 2.0;

/// What to drive.
#[derive(Debug, Clone, Copy)]
pub struct FieldPlan {
    /// East-west extent of the field, metres.
    pub width: f64,
    /// North-south extent of the field, metres.
    pub length: f64,
    pub passes: usize,
    pub speed_kmh: f64,
    /// Sideways error each pass starts with, metres; positive is right.
    pub start_offset: f64,
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub index: usize,
    pub ticks: u64,
    pub guided_ticks: u64,
    /// Largest guided cross-track error, metres.
    pub max_abs_xte: f64,
    /// Cross-track error on the final guided tick, metres.
    pub final_xte: Option<f64>,
    pub strip: Option<StripOutcome>,
}

/// A `width` × `length` field with its south-west corner at the origin,
/// fenced counter-clockwise with a post every metre.
///
/// # Errors
///
/// Returns [`EngineError`] when either side is shorter than a metre.
pub fn rectangular_field(width: f64, length: f64) -> Result<FieldBoundary, EngineError> {
    let posts = |extent: f64| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = extent.floor().max(0.0) as u32;
        (0..n).map(f64::from)
    };
    let south = posts(width).map(|x| Point2::new(x, 0.0));
    let east = posts(length).map(|y| Point2::new(width, y));
    let north = posts(width).map(|x| Point2::new(width - x, length));
    let west = posts(length).map(|y| Point2::new(0.0, length - y));
    let fence: Vec<Point2> = south.chain(east).chain(north).chain(west).collect();
    Ok(FieldBoundary::new(Polygon::new(&fence)?))
}

/// Drive `plan` through `session`, finishing the session after every
/// pass. `elapsed_secs` is the run clock and keeps counting across calls.
pub fn drive(
    session: &mut GuidanceSession,
    plan: &FieldPlan,
    elapsed_secs: &mut f64,
) -> Vec<PassSummary> {
    let hz = session.config().guidance.tick_rate_hz;
    let dt = 1.0 / hz;
    let speed_ms = plan.speed_kmh / 3.6;
    let wheelbase = session.config().vehicle.wheelbase;
    let pass_width = session.config().tool.effective_width();
    let run = (plan.length - 2.0 * END_MARGIN_M).max(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_ticks = (3.0 * run / (speed_ms * dt)).ceil().max(1.0) as u64;

    let mut summaries = Vec::with_capacity(plan.passes);
    for index in 0..plan.passes {
        #[allow(clippy::cast_precision_loss)]
        let easting = (index as f64 + 0.5) * pass_width;
        let northbound = index % 2 == 0;
        let (start_northing, heading) = if northbound {
            (END_MARGIN_M, 0.0)
        } else {
            (plan.length - END_MARGIN_M, std::f64::consts::PI)
        };
        let mut pose =
            Point3::new(easting, start_northing, heading).shifted_right(plan.start_offset);
        info!(
            "[Sim] pass {index} at easting {easting:.2}, {}",
            if northbound { "northbound" } else { "southbound" }
        );

        let mut summary = PassSummary {
            index,
            ticks: 0,
            guided_ticks: 0,
            max_abs_xte: 0.0,
            final_xte: None,
            strip: None,
        };
        while summary.ticks < max_ticks {
            let along = (pose.northing - start_northing).abs();
            if along >= run {
                break;
            }
            let axle = pose.ahead(wheelbase);
            let report = session.tick(&TickInputs {
                pivot: pose,
                steer_axle: Point3::new(axle.easting, axle.northing, pose.heading),
                speed_kmh: plan.speed_kmh,
                avg_speed_kmh: plan.speed_kmh,
                autosteer_engaged: true,
                in_u_turn: false,
                elapsed_secs: *elapsed_secs,
            });
            *elapsed_secs += dt;
            summary.ticks += 1;

            let steer = if report.output.is_valid() {
                let xte = report.output.distance_from_line;
                summary.guided_ticks += 1;
                summary.max_abs_xte = summary.max_abs_xte.max(xte.abs());
                summary.final_xte = Some(xte);
                report.output.steer_angle_deg.to_radians()
            } else {
                0.0
            };
            let yaw_rate = speed_ms * steer.tan() / wheelbase;
            let heading = normalize_positive(yaw_rate.mul_add(dt, pose.heading));
            let next = pose.position().advanced(heading, speed_ms * dt);
            pose = Point3::new(next.easting, next.northing, heading);
        }

        let (strip, _) = session.finish(pose);
        summary.strip = strip;
        *elapsed_secs += TURN_SECS;
        summaries.push(summary);
    }
    summaries
}
