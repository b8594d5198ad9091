//! Field boundaries and point-in-area queries.
//!
//! A [`FieldBoundary`] is an outer fence ring, any number of inner
//! exclusion rings, and an optional headland ring. Point tests run
//! against a decimated copy of each ring (the "ear" ring) that drops
//! points where the heading barely changes; the full ring is kept for
//! offsetting and drawing.
//!
//! The engine only ever asks boolean questions through
//! [`BoundaryQuery`]; it never mutates boundary data.

use geo::{Area, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::config::EngineError;
use crate::geometry::{Bounds, Point2, Point3, heading_of};

/// Accumulated heading change that keeps a point in the decimated ring.
const EAR_HEADING_THRESHOLD: f64 = 0.005;

/// Boolean queries the engine makes against field boundaries.
pub trait BoundaryQuery {
    /// Whether any boundary is loaded. Without one, every point counts as
    /// inside the field and none as in the headland.
    fn has_boundary(&self) -> bool;

    /// Inside the outer ring and outside every inner ring.
    fn is_inside_field(&self, p: Point2) -> bool;

    /// Inside the field but outside the headland ring.
    fn is_in_headland(&self, p: Point2) -> bool;
}

/// A closed boundary ring.
///
/// Serialized as its list of poses; deserializing re-runs the
/// construction checks and rebuilds the decimated ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point3>", into = "Vec<Point3>")]
pub struct Polygon {
    points: Vec<Point3>,
    ear: Vec<Point2>,
}

impl Polygon {
    /// Build a ring from positions; each point's heading points at the
    /// next point, wrapping at the end.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptyPolygon`] for no points and
    /// [`EngineError::DegeneratePolygon`] for fewer than three.
    pub fn new(points: &[Point2]) -> Result<Self, EngineError> {
        check_ring_len(points.len())?;
        let n = points.len();
        let poses = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let next = points[(i + 1) % n];
                Point3::new(
                    p.easting,
                    p.northing,
                    heading_of(next.easting - p.easting, next.northing - p.northing),
                )
            })
            .collect();
        Ok(Self::from_checked_poses(poses))
    }

    /// Build a ring from poses that already carry headings.
    ///
    /// # Errors
    ///
    /// Same as [`Polygon::new`].
    pub fn from_poses(points: Vec<Point3>) -> Result<Self, EngineError> {
        check_ring_len(points.len())?;
        Ok(Self::from_checked_poses(points))
    }

    fn from_checked_poses(points: Vec<Point3>) -> Self {
        let ear = decimate(&points);
        Self { points, ear }
    }

    /// Full-resolution ring points.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Decimated ring used for point tests.
    #[must_use]
    pub fn ear(&self) -> &[Point2] {
        &self.ear
    }

    /// Even-odd crossing test against the decimated ring.
    #[must_use]
    pub fn contains(&self, p: Point2) -> bool {
        point_in_ring(&self.ear, p)
    }

    /// Bounding box of the full ring.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let first = self.points[0].position();
        Bounds::from_points(self.points.iter().map(|p| p.position()))
            .unwrap_or_else(|| Bounds::new(first, first))
    }

    /// Shoelace signed area; positive for counter-clockwise rings (viewed
    /// with north up and east right).
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.easting.mul_add(b.northing, -(b.easting * a.northing))
            })
            .sum();
        twice * 0.5
    }

    /// Unsigned enclosed area in square metres.
    #[must_use]
    pub fn area(&self) -> f64 {
        geo::Polygon::new(self.to_line_string(), Vec::new()).unsigned_area()
    }

    /// Whether the ring winds clockwise, i.e. its interior lies to the
    /// right of the direction of travel.
    #[must_use]
    pub fn is_clockwise(&self) -> bool {
        self.signed_area() < 0.0
    }

    fn to_line_string(&self) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|p| Coord {
                x: p.easting,
                y: p.northing,
            })
            .collect();
        coords.push(coords[0]);
        LineString::new(coords)
    }
}

impl TryFrom<Vec<Point3>> for Polygon {
    type Error = EngineError;

    fn try_from(points: Vec<Point3>) -> Result<Self, Self::Error> {
        Self::from_poses(points)
    }
}

impl From<Polygon> for Vec<Point3> {
    fn from(polygon: Polygon) -> Self {
        polygon.points
    }
}

fn check_ring_len(len: usize) -> Result<(), EngineError> {
    match len {
        0 => Err(EngineError::EmptyPolygon),
        1 | 2 => Err(EngineError::DegeneratePolygon(len)),
        _ => Ok(()),
    }
}

/// Keep the first point and every point where the heading has turned
/// by more than [`EAR_HEADING_THRESHOLD`] since the last kept point.
fn decimate(points: &[Point3]) -> Vec<Point2> {
    let mut ear = Vec::with_capacity(points.len());
    ear.push(points[0].position());
    let mut delta = 0.0;
    for pair in points.windows(2) {
        delta += pair[0].heading - pair[1].heading;
        if f64::abs(delta) > EAR_HEADING_THRESHOLD {
            ear.push(pair[1].position());
            delta = 0.0;
        }
    }
    if ear.len() < 3 {
        return points.iter().map(|p| p.position()).collect();
    }
    ear
}

/// Even-odd ray casting towards negative easting.
///
/// A vertex exactly on the ray counts as above it, so a ray passing
/// through a vertex is counted once.
fn point_in_ring(ring: &[Point2], p: Point2) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for (i, pi) in ring.iter().enumerate() {
        let pj = ring[j];
        let straddles = (pi.northing < p.northing && pj.northing >= p.northing)
            || (pj.northing < p.northing && pi.northing >= p.northing);
        if straddles {
            let t = (p.northing - pi.northing) / (pj.northing - pi.northing);
            let crossing = t.mul_add(pj.easting - pi.easting, pi.easting);
            if crossing < p.easting {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Outer fence, inner exclusion rings and optional headland ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBoundary {
    outer: Polygon,
    inner: Vec<Polygon>,
    headland: Option<Polygon>,
}

impl FieldBoundary {
    /// A field with only an outer fence.
    #[must_use]
    pub const fn new(outer: Polygon) -> Self {
        Self {
            outer,
            inner: Vec::new(),
            headland: None,
        }
    }

    /// Add an inner exclusion ring (pond, building, tree line).
    #[must_use]
    pub fn with_inner(mut self, ring: Polygon) -> Self {
        self.inner.push(ring);
        self
    }

    /// Set the headland ring.
    #[must_use]
    pub fn with_headland(mut self, ring: Polygon) -> Self {
        self.headland = Some(ring);
        self
    }

    #[must_use]
    pub const fn outer(&self) -> &Polygon {
        &self.outer
    }

    #[must_use]
    pub fn inner(&self) -> &[Polygon] {
        &self.inner
    }

    #[must_use]
    pub const fn headland(&self) -> Option<&Polygon> {
        self.headland.as_ref()
    }

    /// Outer ring followed by every inner ring.
    pub fn rings(&self) -> impl Iterator<Item = &Polygon> {
        std::iter::once(&self.outer).chain(self.inner.iter())
    }

    /// Bounding box of the outer ring.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.outer.bounds()
    }

    /// Workable area: outer area minus the inner rings, square metres.
    #[must_use]
    pub fn area(&self) -> f64 {
        let polygon = geo::Polygon::new(
            self.outer.to_line_string(),
            self.inner.iter().map(Polygon::to_line_string).collect(),
        );
        polygon.unsigned_area()
    }
}

impl BoundaryQuery for FieldBoundary {
    fn has_boundary(&self) -> bool {
        true
    }

    fn is_inside_field(&self, p: Point2) -> bool {
        self.outer.contains(p) && !self.inner.iter().any(|ring| ring.contains(p))
    }

    fn is_in_headland(&self, p: Point2) -> bool {
        self.headland
            .as_ref()
            .is_some_and(|ring| self.is_inside_field(p) && !ring.contains(p))
    }
}

impl<T: BoundaryQuery> BoundaryQuery for Option<T> {
    fn has_boundary(&self) -> bool {
        self.as_ref().is_some_and(|b| b.has_boundary())
    }

    fn is_inside_field(&self, p: Point2) -> bool {
        self.as_ref().is_none_or(|b| b.is_inside_field(p))
    }

    fn is_in_headland(&self, p: Point2) -> bool {
        self.as_ref().is_some_and(|b| b.is_in_headland(p))
    }
}
