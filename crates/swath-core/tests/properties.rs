//! Behavioural properties of the engine exercised through the public API.

#![allow(clippy::unwrap_used)]

use approx::{assert_abs_diff_eq, assert_relative_eq};
use swath_core::contour::{ClearReason, ContourEngine, GuideLineOutcome, Strip, StripOutcome};
use swath_core::section::SectionMode;
use swath_core::steering::{GuidanceOutput, NO_GUIDANCE_DISTANCE, SteeringInput, SteeringLawKind};
use swath_core::{
    CoverageEngine, CoverageGrid, CoverageQuad, EngineConfig, FillRule, GuidanceSession, Point2,
    Point3, TickInputs, ToolConfig, TriangleRasterizer, VehicleConfig,
};

fn rect(x0: f64, x1: f64, y0: f64, y1: f64) -> CoverageQuad {
    CoverageQuad {
        left: Point2::new(x0, y1),
        right: Point2::new(x1, y1),
        prev_left: Point2::new(x0, y0),
        prev_right: Point2::new(x1, y0),
    }
}

/// Grid and both rasterizer variants over the same 40 m × 60 m extent.
fn engines() -> (CoverageGrid, TriangleRasterizer, TriangleRasterizer) {
    let origin = Point2::new(-10.0, -10.0);
    (
        CoverageGrid::with_resolution(origin, 0.1, 400, 600),
        TriangleRasterizer::new(origin, 10.0, 400, 600).with_fill_rule(FillRule::HalfOpen),
        TriangleRasterizer::new(origin, 10.0, 400, 600).with_fill_rule(FillRule::Inclusive),
    )
}

#[test]
fn single_pass_area_agrees_across_engines() {
    let (mut grid, mut half_open, mut inclusive) = engines();
    let pass = rect(0.0, 10.0, 0.0, 30.0);
    grid.mark_quad(&pass);
    half_open.mark_quad(&pass);
    inclusive.mark_quad(&pass);

    let worked = pass.area();
    let g = grid.calculate_overlap(worked).unwrap();
    let h = half_open.calculate_overlap(worked).unwrap().stats;
    let i = inclusive.calculate_overlap(worked).unwrap().stats;
    assert_relative_eq!(g.actual_area_covered, 300.0, max_relative = 0.01);
    assert_relative_eq!(h.actual_area_covered, g.actual_area_covered, max_relative = 0.01);
    assert_relative_eq!(i.actual_area_covered, g.actual_area_covered, max_relative = 0.01);
    assert_abs_diff_eq!(g.overlap_percent, 0.0);
    assert_abs_diff_eq!(h.overlap_percent, 0.0);
}

#[test]
fn overlapping_passes_agree_with_half_open_spans() {
    let (mut grid, mut half_open, mut inclusive) = engines();
    let passes = [rect(0.0, 10.0, 0.0, 30.0), rect(5.0, 15.0, 0.0, 30.0)];
    for pass in &passes {
        grid.mark_quad(pass);
        half_open.mark_quad(pass);
        inclusive.mark_quad(pass);
    }

    let worked: f64 = passes.iter().map(CoverageQuad::area).sum();
    let g = grid.calculate_overlap(worked).unwrap();
    let h = half_open.calculate_overlap(worked).unwrap().stats;
    assert_relative_eq!(h.actual_area_covered, 450.0, max_relative = 1e-9);
    assert_relative_eq!(g.actual_area_covered, h.actual_area_covered, max_relative = 0.01);
    assert!((g.overlap_percent - h.overlap_percent).abs() < 1.0);

    // Closed spans count shared diagonals twice, so their wider buckets
    // hide most of a genuine second pass.
    let i = inclusive.calculate_overlap(worked).unwrap().stats;
    assert!(i.overlap_percent < g.overlap_percent / 2.0);
}

fn tool(width: f64) -> ToolConfig {
    ToolConfig {
        width,
        overlap: 0.0,
        offset: 0.0,
        ..ToolConfig::default()
    }
}

fn record(engine: &mut ContourEngine, points: u32) -> StripOutcome {
    let tool = tool(3.0);
    engine.start_strip(Point3::new(0.0, 0.0, 0.0), &tool);
    for n in 1..points {
        engine.add_point(Point3::new(0.0, f64::from(n), 0.0), &tool);
    }
    engine.stop_strip(Point3::new(0.0, f64::from(points), 0.0), &tool)
}

#[test]
fn ten_points_discard_eleven_seal() {
    let mut engine = ContourEngine::new(3.0);
    assert_eq!(record(&mut engine, 10), StripOutcome::Discarded { points: 10 });
    assert!(engine.strips().is_empty());
    assert_eq!(
        record(&mut engine, 11),
        StripOutcome::Sealed {
            index: 0,
            points: 12
        }
    );
    assert_eq!(engine.strips().len(), 1);
}

fn north(tick: u32) -> TickInputs {
    let northing = f64::from(tick);
    TickInputs {
        pivot: Point3::new(0.0, northing, 0.0),
        steer_axle: Point3::new(0.0, northing + 3.3, 0.0),
        speed_kmh: 36.0,
        avg_speed_kmh: 36.0,
        autosteer_engaged: false,
        in_u_turn: false,
        elapsed_secs: f64::from(tick) * 0.1,
    }
}

#[test]
fn turn_off_delay_keeps_sections_on_for_ten_ticks() {
    let mut config = EngineConfig::default();
    config.tool.turn_off_delay_secs = 2.0;
    let mut session = GuidanceSession::new(config, None).unwrap();
    for t in 0..5 {
        assert_eq!(session.tick(&north(t)).actuation_mask, 0b111);
    }

    session.sections_mut().set_all_modes(SectionMode::Off);
    for t in 5..15 {
        assert_eq!(session.tick(&north(t)).actuation_mask, 0b111, "tick {t}");
    }
    assert_eq!(session.tick(&north(15)).actuation_mask, 0);
}

fn strip_along(easting: f64, northings: impl Iterator<Item = f64>) -> Strip {
    northings
        .map(|n| Point3::new(easting, n, 0.0))
        .collect::<Vec<_>>()
        .into()
}

fn steer(engine: &mut ContourEngine, pivot: Point3, vehicle: &VehicleConfig) -> GuidanceOutput {
    let input = SteeringInput {
        pivot,
        steer_axle: Point3::new(pivot.easting, pivot.northing + 3.3, pivot.heading),
        speed_kmh: 5.0,
        avg_speed_kmh: 5.0,
        autosteer_engaged: true,
        in_u_turn: false,
        vehicle,
    };
    engine.distance_from_contour_line(&SteeringLawKind::PurePursuit, &input)
}

#[test]
fn adjacent_pass_builds_offset_guide_line() {
    let tool = tool(3.0);
    let vehicle = VehicleConfig::default();
    let pivot = Point3::new(3.0, 15.0, 0.0);

    // Three points 10 m apart project to too few points to steer by.
    let mut sparse = ContourEngine::new(3.0);
    sparse.load_strips(vec![strip_along(0.0, [0.0, 10.0, 20.0].into_iter())]);
    assert_eq!(
        sparse.build_guide_line(pivot, 0.0, &tool),
        GuideLineOutcome::Cleared(ClearReason::TooFewPoints(3))
    );

    let mut engine = ContourEngine::new(3.0);
    engine.load_strips(vec![strip_along(0.0, (0..=20).map(f64::from))]);
    assert_eq!(
        engine.build_guide_line(pivot, 0.0, &tool),
        GuideLineOutcome::Built {
            strip: 0,
            passes_away: 1,
            points: 21
        }
    );
    for p in engine.guide_line() {
        assert_abs_diff_eq!(p.easting, 3.0, epsilon = 1e-9);
    }

    // Half a metre right of the line: steer left.
    let output = steer(&mut engine, Point3::new(3.5, 15.0, 0.0), &vehicle);
    assert!(output.is_valid());
    assert_abs_diff_eq!(output.distance_from_line, 0.5, epsilon = 1e-9);
    assert!(output.steer_angle_deg < 0.0);
}

#[test]
fn eight_point_guide_line_is_no_guidance() {
    let tool = tool(3.0);
    let vehicle = VehicleConfig::default();
    let pivot = Point3::new(3.0, 2.0, 0.0);
    for (len, valid) in [(8_u32, false), (9, true)] {
        let mut engine = ContourEngine::new(3.0);
        engine.load_strips(vec![strip_along(0.0, (0..len).map(f64::from))]);
        assert!(matches!(
            engine.build_guide_line(pivot, 0.0, &tool),
            GuideLineOutcome::Built { points, .. } if points == usize::try_from(len).unwrap()
        ));
        let output = steer(&mut engine, pivot, &vehicle);
        assert_eq!(output.is_valid(), valid, "{len} points");
        if !valid {
            assert_abs_diff_eq!(output.distance_from_line, NO_GUIDANCE_DISTANCE);
            assert_eq!(output.autosteer_words().0, 32000);
        }
    }
}
