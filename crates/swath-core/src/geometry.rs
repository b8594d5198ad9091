//! Planar geometry kernel: points, headings, distances and line tests.
//!
//! Coordinates live in a local tangent plane measured in metres
//! (easting, northing). Headings are radians measured clockwise from
//! north, so travelling one metre along heading `h` moves a point by
//! `(sin h, cos h)`. Every other module in the crate builds on these
//! primitives.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// A full turn in radians.
pub const TWO_PI: f64 = std::f64::consts::TAU;

/// A quarter turn in radians.
pub const PI_BY_2: f64 = std::f64::consts::FRAC_PI_2;

/// Squared-length threshold below which a segment is treated as a point.
const DEGENERATE_EPSILON: f64 = f64::EPSILON;

/// A 2D position in the local plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// Metres east of the local origin.
    pub easting: f64,
    /// Metres north of the local origin.
    pub northing: f64,
}

impl Point2 {
    /// Create a new point.
    #[must_use]
    pub const fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let de = self.easting - other.easting;
        let dn = self.northing - other.northing;
        de.mul_add(de, dn * dn)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`, `t = 1` is `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            t.mul_add(other.easting - self.easting, self.easting),
            t.mul_add(other.northing - self.northing, self.northing),
        )
    }

    /// Move `distance` metres along `heading`.
    #[must_use]
    pub fn advanced(self, heading: f64, distance: f64) -> Self {
        Self::new(
            heading.sin().mul_add(distance, self.easting),
            heading.cos().mul_add(distance, self.northing),
        )
    }
}

/// A position plus heading, used for poses and recorded path points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    /// Metres east of the local origin.
    pub easting: f64,
    /// Metres north of the local origin.
    pub northing: f64,
    /// Heading in radians, clockwise from north.
    pub heading: f64,
}

impl Point3 {
    /// Create a new pose.
    #[must_use]
    pub const fn new(easting: f64, northing: f64, heading: f64) -> Self {
        Self {
            easting,
            northing,
            heading,
        }
    }

    /// The position without the heading.
    #[must_use]
    pub const fn position(self) -> Point2 {
        Point2::new(self.easting, self.northing)
    }

    /// Shift sideways by `distance` metres; positive moves to the right of
    /// the heading, negative to the left. The heading is kept.
    #[must_use]
    pub fn shifted_right(self, distance: f64) -> Self {
        Self::new(
            self.heading.cos().mul_add(distance, self.easting),
            self.heading.sin().mul_add(-distance, self.northing),
            self.heading,
        )
    }

    /// The point `distance` metres ahead along the heading.
    #[must_use]
    pub fn ahead(self, distance: f64) -> Point2 {
        self.position().advanced(self.heading, distance)
    }
}

impl From<Point3> for Point2 {
    fn from(p: Point3) -> Self {
        p.position()
    }
}

/// Whether two headings point broadly the same way or broadly opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    /// Headings differ by less than a quarter turn.
    Same,
    /// Headings differ by a quarter turn or more.
    Opposite,
}

/// Normalize an angle into `[0, 2π)`.
#[must_use]
pub fn normalize_positive(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TWO_PI);
    // rem_euclid of a tiny negative value rounds up to exactly 2π.
    if wrapped >= TWO_PI { 0.0 } else { wrapped }
}

/// Normalize an angle into `(-π, π]`.
#[must_use]
pub fn normalize_signed(angle: f64) -> f64 {
    let wrapped = normalize_positive(angle);
    if wrapped > PI { wrapped - TWO_PI } else { wrapped }
}

/// Unsigned angular difference between two headings, in `[0, π]`.
#[must_use]
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (normalize_positive(a) - normalize_positive(b)).abs();
    if d > PI { TWO_PI - d } else { d }
}

/// Shortest signed rotation from `from` to `to`, in `(-π, π]`.
///
/// Positive values rotate clockwise (towards increasing heading).
#[must_use]
pub fn heading_delta(from: f64, to: f64) -> f64 {
    normalize_signed(to - from)
}

/// Classify two headings as [`Travel::Same`] or [`Travel::Opposite`]
/// using a quarter-turn threshold.
#[must_use]
pub fn classify_travel(a: f64, b: f64) -> Travel {
    if angle_diff(a, b) < PI_BY_2 {
        Travel::Same
    } else {
        Travel::Opposite
    }
}

/// Fold an unsigned heading difference in `[0, π]` onto `[0, π/2]`,
/// treating anti-parallel lines as parallel.
#[must_use]
pub fn fold_to_quarter(delta: f64) -> f64 {
    if delta > PI_BY_2 {
        (delta - PI).abs()
    } else {
        delta
    }
}

/// Heading of the vector `(de, dn)`, in `[0, 2π)`.
#[must_use]
pub fn heading_of(de: f64, dn: f64) -> f64 {
    normalize_positive(de.atan2(dn))
}

/// Signed perpendicular distance from `p` to the infinite line through
/// `a` and `b`.
///
/// Positive when `p` lies to the right of the direction `a → b`,
/// negative to the left. Returns `None` when `a` and `b` coincide.
#[must_use]
pub fn signed_distance_to_line(a: Point2, b: Point2, p: Point2) -> Option<f64> {
    let de = b.easting - a.easting;
    let dn = b.northing - a.northing;
    if de.abs() < DEGENERATE_EPSILON && dn.abs() < DEGENERATE_EPSILON {
        return None;
    }
    let cross = dn.mul_add(p.easting, -(de * p.northing))
        + b.easting.mul_add(a.northing, -(b.northing * a.easting));
    Some(cross / de.hypot(dn))
}

/// Foot of the perpendicular from `p` onto the infinite line through
/// `a` and `b`. Returns `None` when `a` and `b` coincide.
#[must_use]
pub fn closest_point_on_line(a: Point2, b: Point2, p: Point2) -> Option<Point2> {
    let de = b.easting - a.easting;
    let dn = b.northing - a.northing;
    let len_sq = de.mul_add(de, dn * dn);
    if len_sq < DEGENERATE_EPSILON {
        return None;
    }
    let u = (p.easting - a.easting).mul_add(de, (p.northing - a.northing) * dn) / len_sq;
    Some(a.lerp(b, u))
}

/// Unsigned area of the triangle `a, b, c`.
#[must_use]
pub fn triangle_area(a: Point2, b: Point2, c: Point2) -> f64 {
    let cross = (b.easting - a.easting).mul_add(
        c.northing - a.northing,
        -((c.easting - a.easting) * (b.northing - a.northing)),
    );
    cross.abs() * 0.5
}

/// Axis-aligned bounding box in the local plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// South-west corner.
    pub min: Point2,
    /// North-east corner.
    pub max: Point2,
}

impl Bounds {
    /// Create bounds from two corners. The corners are reordered so that
    /// `min` is never greater than `max` on either axis.
    #[must_use]
    pub const fn new(a: Point2, b: Point2) -> Self {
        Self {
            min: Point2::new(a.easting.min(b.easting), a.northing.min(b.northing)),
            max: Point2::new(a.easting.max(b.easting), a.northing.max(b.northing)),
        }
    }

    /// Smallest bounds enclosing every point, or `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point2>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: Point2::new(acc.min.easting.min(p.easting), acc.min.northing.min(p.northing)),
            max: Point2::new(acc.max.easting.max(p.easting), acc.max.northing.max(p.northing)),
        }))
    }

    /// Grow the box by `margin` metres on every side.
    #[must_use]
    pub fn padded(self, margin: f64) -> Self {
        Self {
            min: Point2::new(self.min.easting - margin, self.min.northing - margin),
            max: Point2::new(self.max.easting + margin, self.max.northing + margin),
        }
    }

    /// East-west extent in metres.
    #[must_use]
    pub fn width(self) -> f64 {
        self.max.easting - self.min.easting
    }

    /// North-south extent in metres.
    #[must_use]
    pub fn height(self) -> f64 {
        self.max.northing - self.min.northing
    }

    /// Whether `p` lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(self, p: Point2) -> bool {
        (self.min.easting..=self.max.easting).contains(&p.easting)
            && (self.min.northing..=self.max.northing).contains(&p.northing)
    }
}
