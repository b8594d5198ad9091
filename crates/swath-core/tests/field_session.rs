//! End-to-end: two contour passes over a bounded field.

#![allow(clippy::unwrap_used)]

use std::f64::consts::PI;

use swath_core::contour::GuideLineOutcome;
use swath_core::{
    EngineConfig, FieldBoundary, GuidanceSession, MemoryStripStore, Point2, Point3, Polygon,
    StripOutcome, StripStore, TickInputs,
};

const HZ: f64 = 10.0;

/// An 80 m × 120 m field fenced counter-clockwise with a post every metre.
fn field() -> FieldBoundary {
    let south = (0..80).map(|k| Point2::new(f64::from(k) - 10.0, -10.0));
    let east = (0..120).map(|k| Point2::new(70.0, f64::from(k) - 10.0));
    let north = (0..80).map(|k| Point2::new(70.0 - f64::from(k), 110.0));
    let west = (0..120).map(|k| Point2::new(-10.0, 110.0 - f64::from(k)));
    let fence: Vec<Point2> = south.chain(east).chain(north).chain(west).collect();
    FieldBoundary::new(Polygon::new(&fence).unwrap())
}

/// One tick at 36 km/h: a metre per tick.
fn inputs(tick: u32, easting: f64, northing: f64, heading: f64) -> TickInputs {
    let pivot = Point3::new(easting, northing, heading);
    TickInputs {
        pivot,
        steer_axle: Point3::new(
            heading.sin().mul_add(3.3, easting),
            heading.cos().mul_add(3.3, northing),
            heading,
        ),
        speed_kmh: 36.0,
        avg_speed_kmh: 36.0,
        autosteer_engaged: true,
        in_u_turn: false,
        elapsed_secs: f64::from(tick) / HZ,
    }
}

#[test]
fn second_pass_is_guided_by_the_first() {
    let mut session = GuidanceSession::new(EngineConfig::default(), Some(field())).unwrap();
    let mut tick = 0;

    // Pass 1: northbound along easting 2, tool covering 0..4.
    for n in 0..90 {
        let report = session.tick(&inputs(tick, 2.0, f64::from(n), 0.0));
        assert!(!matches!(report.guide, GuideLineOutcome::Built { .. }));
        assert!(!report.output.is_valid());
        tick += 1;
    }
    let (strip, closed) = session.finish(Point3::new(2.0, 90.0, 0.0));
    assert!(matches!(strip, Some(StripOutcome::Sealed { index: 0, .. })));
    assert!(!closed.events.is_empty());
    let after_first = session.zones().worked_area();
    assert!(after_first > 250.0 && after_first < 365.0, "{after_first}");

    // Pass 2: southbound along easting 6, the next tool width over.
    let mut guided = 0;
    for n in 0..90 {
        let report = session.tick(&inputs(tick, 6.0, 90.0 - f64::from(n), PI));
        tick += 1;
        if let GuideLineOutcome::Built { passes_away, .. } = report.guide {
            assert_eq!(passes_away, 1);
        }
        if report.output.is_valid() {
            guided += 1;
            assert!(
                report.output.distance_from_line.abs() < 0.1,
                "{:?}",
                report.output
            );
        }
        assert_ne!(report.actuation_mask, 0, "sections off at northing {}", 90 - n);
    }
    assert!(guided > 60, "only {guided} guided ticks");
    session.finish(Point3::new(6.0, 0.0, PI));

    let diagnostics = session.diagnostics();
    assert_eq!(diagnostics.strips, 2);
    assert_eq!(diagnostics.field_area.map(f64::round), Some(9600.0));
    // Neighbouring passes barely touch; what overlap the grid reports
    // comes from scanlines shared by consecutive quads.
    let grid = diagnostics.grid.unwrap();
    assert!(grid.overlap_percent < 15.0, "{grid:?}");
    assert!(grid.actual_area_covered > 550.0, "{grid:?}");

    let report = diagnostics.report();
    assert!(report.contains("Strips: 2"));
}

#[test]
fn strips_survive_a_new_session() {
    let mut first = GuidanceSession::new(EngineConfig::default(), Some(field())).unwrap();
    for n in 0..40 {
        first.tick(&inputs(n, 2.0, f64::from(n), 0.0));
    }
    first.finish(Point3::new(2.0, 40.0, 0.0));
    let mut store = MemoryStripStore::new();
    first.save_strips(&mut store).unwrap();
    assert_eq!(store.load_strips().unwrap().len(), 1);

    let mut second = GuidanceSession::new(EngineConfig::default(), Some(field())).unwrap();
    second.load_strips(&store).unwrap();
    let report = second.tick(&inputs(0, 6.0, 20.0, 0.0));
    assert!(matches!(
        report.guide,
        GuideLineOutcome::Built {
            strip: 0,
            passes_away: 1,
            ..
        }
    ));
    assert!(report.output.is_valid());
}

#[test]
fn boundary_contours_give_a_headland_line() {
    let mut session = GuidanceSession::new(EngineConfig::default(), Some(field())).unwrap();
    assert_eq!(session.build_boundary_contours(1, 0), 1);
    // The contour runs northwards 2 m inside the west fence, so a
    // southbound pass one tool width further in follows it.
    let report = session.tick(&inputs(0, -4.0, 50.0, PI));
    assert!(matches!(
        report.guide,
        GuideLineOutcome::Built {
            passes_away: 1,
            ..
        }
    ));
    for p in session.contour().guide_line() {
        assert!((p.easting + 4.0).abs() < 1e-6, "{p:?}");
    }
}
