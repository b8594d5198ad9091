//! Steering laws: turn a guide line and a vehicle pose into a steer angle.
//!
//! This module defines the [`SteeringLaw`] trait for pluggable control
//! laws and the [`SteeringLawKind`] enum for selecting one at runtime.
//! Both laws work against a short polyline of [`Point3`]s and report a
//! [`GuidanceOutput`]. Degenerate geometry (the two nearest points
//! coincide) yields `None`; the caller keeps the previous output.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::VehicleConfig;
use crate::geometry::{
    PI_BY_2, Point2, Point3, TWO_PI, angle_diff, closest_point_on_line, heading_of,
    signed_distance_to_line,
};

/// Distance reported when no guidance is available.
pub const NO_GUIDANCE_DISTANCE: f64 = 32000.0;

/// km/h to m/s.
const KMH_TO_MS: f64 = 0.277_777;

/// Limit on each Stanley term, radians.
const STANLEY_TERM_LIMIT: f64 = 0.74;

/// Selects which steering law to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringLawKind {
    /// Goal point chased along the guide line from the pivot axle.
    #[default]
    PurePursuit,
    /// Heading error plus cross-track arctangent at the steer axle.
    Stanley,
}

/// Everything a steering law reads from the vehicle for one tick.
#[derive(Debug, Clone, Copy)]
pub struct SteeringInput<'a> {
    /// Pivot axle position; its heading is the fix heading.
    pub pivot: Point3,
    /// Steer axle position and heading.
    pub steer_axle: Point3,
    /// Current ground speed, km/h. Negative when reversing.
    pub speed_kmh: f64,
    /// Smoothed ground speed, km/h.
    pub avg_speed_kmh: f64,
    /// Whether the operator has autosteer engaged.
    pub autosteer_engaged: bool,
    /// Whether a U-turn is being driven.
    pub in_u_turn: bool,
    pub vehicle: &'a VehicleConfig,
}

/// One tick of steering output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuidanceOutput {
    /// Signed distance off the guide line, metres; positive is right.
    /// [`NO_GUIDANCE_DISTANCE`] when no guidance is available.
    pub distance_from_line: f64,
    /// Commanded steer angle, degrees; negative steers left.
    pub steer_angle_deg: f64,
    /// Pure-pursuit goal point, if one was computed.
    pub goal_point: Option<Point2>,
}

impl GuidanceOutput {
    /// The "no guidance" output, keeping the last commanded angle.
    #[must_use]
    pub const fn no_guidance(steer_angle_deg: f64) -> Self {
        Self {
            distance_from_line: NO_GUIDANCE_DISTANCE,
            steer_angle_deg,
            goal_point: None,
        }
    }

    /// Whether this output carries a real distance.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        // Sentinel is assigned exactly, never computed.
        #[allow(clippy::float_cmp)]
        let sentinel = self.distance_from_line == NO_GUIDANCE_DISTANCE;
        !sentinel
    }

    /// The `(distance_mm, steer_angle_centideg)` pair sent to the
    /// steering module.
    ///
    /// Distance is rounded half away from zero; the sentinel is sent
    /// as-is. Both words saturate at the `i16` range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn autosteer_words(&self) -> (i16, i16) {
        let distance = if self.is_valid() {
            (self.distance_from_line * 1000.0).round() as i16
        } else {
            NO_GUIDANCE_DISTANCE as i16
        };
        (distance, (self.steer_angle_deg * 100.0) as i16)
    }
}

impl Default for GuidanceOutput {
    fn default() -> Self {
        Self::no_guidance(0.0)
    }
}

/// Low-pass filtered cross-track integrator for pure pursuit.
///
/// The integral only grows while autosteer is engaged, the vehicle is
/// moving above 2.5 km/h, no U-turn is in progress, and the error
/// derivative is small. Otherwise it decays.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PurePursuitIntegral {
    error: f64,
    last_error: f64,
    derivative: f64,
    counter: u8,
    value: f64,
}

impl PurePursuitIntegral {
    const MIN_SPEED_KMH: f64 = 2.5;
    const MAX_DERIVATIVE: f64 = 0.1;
    const DEAD_BAND: f64 = 0.02;
    const LIMIT: f64 = 0.2;
    const DECAY: f64 = 0.95;
    /// The derivative refreshes once the counter has passed this, every sixth update.
    const DERIVATIVE_EVERY: u8 = 4;

    /// Current heading correction, radians.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Zero all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn update(&mut self, distance: f64, input: &SteeringInput<'_>) {
        let gain = input.vehicle.pure_pursuit_integral_gain;
        if gain.abs() < f64::EPSILON {
            self.value = 0.0;
            return;
        }

        self.error = self.error.mul_add(0.8, distance * 0.2);

        let derivative_due = self.counter > Self::DERIVATIVE_EVERY;
        self.counter += 1;
        if derivative_due {
            self.derivative = (self.error - self.last_error) * 2.0;
            self.last_error = self.error;
            self.counter = 0;
        }

        let integrating = input.autosteer_engaged
            && self.derivative.abs() < Self::MAX_DERIVATIVE
            && input.avg_speed_kmh > Self::MIN_SPEED_KMH
            && !input.in_u_turn;

        if !integrating {
            self.value *= Self::DECAY;
            return;
        }

        // Over the line and still heading away: unwind quickly.
        let overshooting =
            (self.value < 0.0 && distance < 0.0) || (self.value > 0.0 && distance > 0.0);
        if overshooting {
            self.value += self.error * gain * -0.06;
        } else if distance.abs() > Self::DEAD_BAND {
            self.value += self.error * gain * -0.02;
            self.value = self.value.clamp(-Self::LIMIT, Self::LIMIT);
        }
    }
}

/// Trait for steering control laws.
pub trait SteeringLaw {
    /// Compute a steer command against `line`.
    ///
    /// Returns `None` when the nearest segment is degenerate.
    fn steer(
        &self,
        line: &[Point3],
        input: &SteeringInput<'_>,
        integral: &mut PurePursuitIntegral,
    ) -> Option<GuidanceOutput>;
}

impl SteeringLaw for SteeringLawKind {
    fn steer(
        &self,
        line: &[Point3],
        input: &SteeringInput<'_>,
        integral: &mut PurePursuitIntegral,
    ) -> Option<GuidanceOutput> {
        match *self {
            Self::PurePursuit => pure_pursuit(line, input, integral),
            Self::Stanley => stanley(line, input),
        }
    }
}

/// Indices of the two points of `line` closest to `p`, in ascending order.
///
/// Returns `None` for lines with fewer than two points.
#[must_use]
pub fn nearest_pair(line: &[Point3], p: Point2) -> Option<(usize, usize)> {
    if line.len() < 2 {
        return None;
    }
    let mut best = (f64::INFINITY, 0);
    let mut second = (f64::INFINITY, 0);
    for (i, q) in line.iter().enumerate() {
        let d = q.position().distance_squared(p);
        if d < best.0 {
            second = best;
            best = (d, i);
        } else if d < second.0 {
            second = (d, i);
        }
    }
    Some((best.1.min(second.1), best.1.max(second.1)))
}

/// Stanley: heading error plus `atan(k·e / (v + 1))`, both limited to
/// ±0.74 rad, measured at the steer axle.
fn stanley(line: &[Point3], input: &SteeringInput<'_>) -> Option<GuidanceOutput> {
    let steer = input.steer_axle;
    let (ia, ib) = nearest_pair(line, steer.position())?;
    let a = line[ia].position();
    let b = line[ib].position();

    let ab_heading = heading_of(b.easting - a.easting, b.northing - a.northing);
    let mut distance = signed_distance_to_line(a, b, steer.position())?;

    let same_way = angle_diff(input.pivot.heading, ab_heading) < PI_BY_2;
    let mut heading_error = if same_way {
        steer.heading - ab_heading
    } else {
        distance = -distance;
        steer.heading - ab_heading + PI
    };

    heading_error = if heading_error > PI {
        heading_error - PI
    } else {
        heading_error + PI
    };
    if heading_error > PI_BY_2 {
        heading_error -= PI;
    } else if heading_error < -PI_BY_2 {
        heading_error += PI;
    }
    heading_error = (heading_error * input.vehicle.stanley_heading_gain)
        .clamp(-STANLEY_TERM_LIMIT, STANLEY_TERM_LIMIT);

    let cross_track = (distance * input.vehicle.stanley_distance_gain
        / input.speed_kmh.abs().mul_add(KMH_TO_MS, 1.0))
    .atan()
    .clamp(-STANLEY_TERM_LIMIT, STANLEY_TERM_LIMIT);

    let combined = if input.speed_kmh > -0.1 {
        cross_track + heading_error
    } else {
        cross_track - heading_error
    };
    let max = input.vehicle.max_steer_angle_deg;
    let steer_angle_deg = (-combined).to_degrees().clamp(-max, max);

    log::trace!(
        "[Steering] stanley d={distance:.3} heading_err={heading_error:.3} steer={steer_angle_deg:.2}"
    );

    Some(GuidanceOutput {
        distance_from_line: distance,
        steer_angle_deg,
        goal_point: None,
    })
}

/// Pure pursuit: walk the guide line from the pivot's projection to a
/// speed-dependent look-ahead distance and steer along the arc through
/// the goal point.
fn pure_pursuit(
    line: &[Point3],
    input: &SteeringInput<'_>,
    integral: &mut PurePursuitIntegral,
) -> Option<GuidanceOutput> {
    let pivot = input.pivot;
    let vehicle = input.vehicle;
    let (mut ia, mut ib) = nearest_pair(line, pivot.position())?;
    let a = line[ia].position();
    let b = line[ib].position();

    let ab_heading = line[ia].heading;
    let distance = signed_distance_to_line(a, b, pivot.position())?;
    integral.update(distance, input);

    let r = closest_point_on_line(a, b, pivot.position())?;
    let goal_distance = vehicle.goal_point_distance(input.avg_speed_kmh, distance);
    let same_way = angle_diff(pivot.heading, ab_heading) < PI_BY_2;

    let goal = if same_way {
        let mut so_far = line[ib].position().distance(r);
        if so_far > goal_distance {
            r.advanced(line[ia].heading, goal_distance)
        } else {
            let mut segment = 0.0;
            while ib < line.len() - 1 {
                ia += 1;
                ib += 1;
                segment = line[ib].position().distance(line[ia].position());
                if segment + so_far > goal_distance {
                    break;
                }
                so_far += segment;
            }
            interpolate_goal(line[ia].position(), line[ib].position(), goal_distance - so_far, segment)
        }
    } else {
        let mut so_far = line[ia].position().distance(r);
        if so_far > goal_distance {
            r.advanced(line[ia].heading, -goal_distance)
        } else {
            let mut segment = 0.0;
            while ia > 0 {
                ia -= 1;
                ib -= 1;
                segment = line[ib].position().distance(line[ia].position());
                if segment + so_far > goal_distance {
                    break;
                }
                so_far += segment;
            }
            interpolate_goal(line[ib].position(), line[ia].position(), goal_distance - so_far, segment)
        }
    };

    let local_heading = if same_way {
        TWO_PI - pivot.heading + integral.value()
    } else {
        TWO_PI - pivot.heading - integral.value()
    };
    let d_squared = goal.distance_squared(pivot.position());
    let lateral = (goal.easting - pivot.easting).mul_add(
        local_heading.cos(),
        (goal.northing - pivot.northing) * local_heading.sin(),
    );
    let max = vehicle.max_steer_angle_deg;
    let mut steer_angle_deg = (2.0 * lateral * vehicle.wheelbase / d_squared)
        .atan()
        .to_degrees()
        .clamp(-max, max);

    let speed_ms = input.speed_kmh * KMH_TO_MS;
    let angular_velocity = TWO_PI * speed_ms * steer_angle_deg.to_radians().tan() / vehicle.wheelbase;
    if angular_velocity.abs() > vehicle.max_angular_velocity {
        let limit = vehicle.max_angular_velocity.copysign(steer_angle_deg);
        steer_angle_deg = (vehicle.wheelbase * limit / (TWO_PI * speed_ms))
            .atan()
            .to_degrees();
    }

    log::trace!(
        "[Steering] pure pursuit d={distance:.3} look_ahead={goal_distance:.2} steer={steer_angle_deg:.2}"
    );

    Some(GuidanceOutput {
        distance_from_line: distance,
        steer_angle_deg,
        goal_point: Some(goal),
    })
}

/// Point `remaining` metres from `from` towards `to`, where the segment
/// is `segment` metres long. A zero-length segment yields `to`.
fn interpolate_goal(from: Point2, to: Point2, remaining: f64, segment: f64) -> Point2 {
    if segment <= f64::EPSILON {
        return to;
    }
    from.lerp(to, remaining / segment)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    /// A northbound line along `easting`, one point per metre.
    fn north_line(easting: f64, len: usize) -> Vec<Point3> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let n = i as f64;
                Point3::new(easting, n, 0.0)
            })
            .collect()
    }

    fn input(pivot: Point3, vehicle: &VehicleConfig) -> SteeringInput<'_> {
        SteeringInput {
            pivot,
            steer_axle: Point3::new(
                pivot.easting,
                pivot.northing + vehicle.wheelbase,
                pivot.heading,
            ),
            speed_kmh: 8.0,
            avg_speed_kmh: 8.0,
            autosteer_engaged: true,
            in_u_turn: false,
            vehicle,
        }
    }

    #[test]
    fn default_is_pure_pursuit() {
        assert_eq!(SteeringLawKind::default(), SteeringLawKind::PurePursuit);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&SteeringLawKind::PurePursuit).unwrap();
        assert_eq!(json, "\"pure_pursuit\"");
    }

    #[test]
    fn nearest_pair_is_ordered() {
        let line = north_line(0.0, 10);
        assert_eq!(nearest_pair(&line, Point2::new(0.2, 4.6)), Some((4, 5)));
        assert_eq!(nearest_pair(&line, Point2::new(0.2, 4.4)), Some((4, 5)));
        assert_eq!(nearest_pair(&line[..1], Point2::new(0.0, 0.0)), None);
    }

    #[test]
    fn pure_pursuit_steers_left_when_right_of_line() {
        let vehicle = VehicleConfig::default();
        let line = north_line(3.0, 40);
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::PurePursuit
            .steer(&line, &input(Point3::new(4.0, 15.0, 0.0), &vehicle), &mut integral)
            .unwrap();
        assert_abs_diff_eq!(out.distance_from_line, 1.0, epsilon = 1e-9);
        assert!(out.steer_angle_deg < 0.0);
        let goal = out.goal_point.unwrap();
        assert_abs_diff_eq!(goal.easting, 3.0, epsilon = 1e-9);
        assert!(goal.northing > 15.0);
    }

    #[test]
    fn pure_pursuit_reversed_line_counts_down() {
        let vehicle = VehicleConfig::default();
        // Line recorded southbound; vehicle still drives north.
        let mut line: Vec<Point3> = north_line(3.0, 40)
            .into_iter()
            .map(|p| Point3::new(p.easting, p.northing, PI))
            .collect();
        line.reverse();
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::PurePursuit
            .steer(&line, &input(Point3::new(4.0, 15.0, 0.0), &vehicle), &mut integral)
            .unwrap();
        assert!(out.goal_point.unwrap().northing > 15.0);
        assert!(out.steer_angle_deg < 0.0);
    }

    #[test]
    fn pure_pursuit_on_line_is_straight() {
        let vehicle = VehicleConfig::default();
        let line = north_line(0.0, 40);
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::PurePursuit
            .steer(&line, &input(Point3::new(0.0, 10.0, 0.0), &vehicle), &mut integral)
            .unwrap();
        assert_abs_diff_eq!(out.steer_angle_deg, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn angular_velocity_limits_steer() {
        let vehicle = VehicleConfig {
            max_angular_velocity: 0.01,
            ..VehicleConfig::default()
        };
        let line = north_line(3.0, 40);
        let mut integral = PurePursuitIntegral::default();
        let mut inp = input(Point3::new(6.0, 15.0, 0.0), &vehicle);
        inp.speed_kmh = 20.0;
        let out = SteeringLawKind::PurePursuit
            .steer(&line, &inp, &mut integral)
            .unwrap();
        let expected = (vehicle.wheelbase * -0.01 / (TWO_PI * 20.0 * KMH_TO_MS))
            .atan()
            .to_degrees();
        assert_abs_diff_eq!(out.steer_angle_deg, expected, epsilon = 1e-9);
    }

    #[test]
    fn stanley_steers_left_when_right_of_line() {
        let vehicle = VehicleConfig::default();
        let line = north_line(3.0, 40);
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::Stanley
            .steer(&line, &input(Point3::new(4.0, 15.0, 0.0), &vehicle), &mut integral)
            .unwrap();
        assert!(out.distance_from_line > 0.0);
        assert!(out.steer_angle_deg < 0.0);
        assert!(out.goal_point.is_none());
    }

    #[test]
    fn stanley_clamps_to_max_steer() {
        let vehicle = VehicleConfig {
            max_steer_angle_deg: 10.0,
            ..VehicleConfig::default()
        };
        let line = north_line(3.0, 40);
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::Stanley
            .steer(&line, &input(Point3::new(20.0, 15.0, 0.0), &vehicle), &mut integral)
            .unwrap();
        assert_abs_diff_eq!(out.steer_angle_deg, -10.0);
    }

    #[test]
    fn stanley_opposite_heading_flips_distance() {
        let vehicle = VehicleConfig::default();
        let line = north_line(3.0, 40);
        let pivot = Point3::new(4.0, 20.0, PI);
        let inp = SteeringInput {
            steer_axle: Point3::new(4.0, 20.0 - vehicle.wheelbase, PI),
            ..input(pivot, &vehicle)
        };
        let mut integral = PurePursuitIntegral::default();
        let out = SteeringLawKind::Stanley
            .steer(&line, &inp, &mut integral)
            .unwrap();
        // East of a northbound line is left of a southbound vehicle.
        assert!(out.distance_from_line < 0.0);
        assert!(out.steer_angle_deg > 0.0);
    }

    #[test]
    fn degenerate_segment_yields_none() {
        let vehicle = VehicleConfig::default();
        let line = vec![Point3::new(1.0, 1.0, 0.0); 10];
        let mut integral = PurePursuitIntegral::default();
        let inp = input(Point3::new(0.0, 0.0, 0.0), &vehicle);
        assert!(SteeringLawKind::Stanley.steer(&line, &inp, &mut integral).is_none());
        assert!(
            SteeringLawKind::PurePursuit
                .steer(&line, &inp, &mut integral)
                .is_none()
        );
    }

    #[test]
    fn integral_stays_zero_without_gain() {
        let vehicle = VehicleConfig::default();
        let mut integral = PurePursuitIntegral::default();
        let inp = input(Point3::new(0.0, 0.0, 0.0), &vehicle);
        for _ in 0..20 {
            integral.update(0.5, &inp);
        }
        assert_abs_diff_eq!(integral.value(), 0.0);
    }

    #[test]
    fn integral_accumulates_and_is_limited() {
        let vehicle = VehicleConfig {
            pure_pursuit_integral_gain: 1.0,
            ..VehicleConfig::default()
        };
        let mut integral = PurePursuitIntegral::default();
        let inp = input(Point3::new(0.0, 0.0, 0.0), &vehicle);
        // Warm the filter so the derivative settles.
        for _ in 0..200 {
            integral.update(0.05, &inp);
        }
        assert!(integral.value() < 0.0);
        assert!(integral.value() >= -0.2);
    }

    #[test]
    fn integral_derivative_refreshes_every_sixth_update() {
        let vehicle = VehicleConfig {
            pure_pursuit_integral_gain: 1.0,
            ..VehicleConfig::default()
        };
        let mut integral = PurePursuitIntegral::default();
        let inp = input(Point3::new(0.0, 0.0, 0.0), &vehicle);
        for _ in 0..5 {
            integral.update(1.0, &inp);
        }
        assert_abs_diff_eq!(integral.derivative, 0.0);
        integral.update(1.0, &inp);
        assert!(integral.derivative > 0.0);
        assert_eq!(integral.counter, 0);
        for _ in 0..5 {
            integral.update(1.0, &inp);
        }
        let held = integral.derivative;
        assert_eq!(integral.counter, 5);
        integral.update(1.0, &inp);
        assert!(integral.derivative < held);
        assert_eq!(integral.counter, 0);
    }

    #[test]
    fn integral_decays_when_autosteer_off() {
        let vehicle = VehicleConfig {
            pure_pursuit_integral_gain: 1.0,
            ..VehicleConfig::default()
        };
        let mut integral = PurePursuitIntegral::default();
        let inp = input(Point3::new(0.0, 0.0, 0.0), &vehicle);
        for _ in 0..200 {
            integral.update(0.05, &inp);
        }
        let before = integral.value();
        let off = SteeringInput {
            autosteer_engaged: false,
            ..inp
        };
        integral.update(0.05, &off);
        assert_abs_diff_eq!(integral.value(), before * 0.95, epsilon = 1e-12);
    }

    #[test]
    fn autosteer_words_round_away_from_zero() {
        let out = GuidanceOutput {
            distance_from_line: -0.0625,
            steer_angle_deg: 5.678,
            goal_point: None,
        };
        assert_eq!(out.autosteer_words(), (-63, 567));
    }

    #[test]
    fn sentinel_words() {
        let out = GuidanceOutput::no_guidance(2.5);
        assert!(!out.is_valid());
        assert_eq!(out.autosteer_words(), (32000, 250));
    }
}
