//! SVG field overview.
//!
//! Draws the boundary rings, sealed strips, mapping patches and the
//! current guide line in one document, built with the [`svg`] crate.
//! World coordinates are metres with north up; the `viewBox` spans the
//! content's bounding box plus a margin, with the northing axis flipped
//! so the SVG y axis runs south.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use swath_core::zones::MappingPatch;
use swath_core::{Bounds, FieldBoundary, Point2, Point3, Strip};

/// Margin around the drawn content, metres.
const MARGIN_M: f64 = 5.0;

/// Patch fill colours, cycled by patch colour index.
const PATCH_COLORS: [&str; 6] = [
    "#7cb342", "#43a047", "#00897b", "#039be5", "#8e24aa", "#f4511e",
];

/// Metadata to embed in the SVG document.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Emitted as `<title>`.
    pub title: Option<&'a str>,

    /// Emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized engine configuration, emitted inside `<metadata>`
    /// wrapped in a namespaced `<swath:config>` element.
    pub config_json: Option<&'a str>,
}

/// Everything one overview draws. Empty parts are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldScene<'a> {
    pub boundary: Option<&'a FieldBoundary>,
    pub strips: &'a [Strip],
    pub patches: &'a [MappingPatch],
    pub guide_line: &'a [Point3],
}

impl FieldScene<'_> {
    /// Bounding box of every drawn point, `None` for an empty scene.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        let rings = self
            .boundary
            .into_iter()
            .flat_map(FieldBoundary::rings)
            .flat_map(|ring| ring.points().iter().map(|p| p.position()));
        let strips = self
            .strips
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.position()));
        let patches = self.patches.iter().flat_map(|p| p.vertices.iter().copied());
        let guide = self.guide_line.iter().map(|p| p.position());
        Bounds::from_points(rings.chain(strips).chain(patches).chain(guide))
    }
}

/// Maps world metres into the flipped `viewBox` space.
#[derive(Debug, Clone, Copy)]
struct Frame {
    min_easting: f64,
    max_northing: f64,
}

impl Frame {
    fn point(self, p: Point2) -> (f64, f64) {
        (p.easting - self.min_easting, self.max_northing - p.northing)
    }
}

/// Path data through `points`; empty for fewer than two points.
fn path_data(frame: Frame, points: impl IntoIterator<Item = Point2>, closed: bool) -> String {
    let mut points = points.into_iter();
    let Some(first) = points.next() else {
        return String::new();
    };
    let mut data = Data::new().move_to(frame.point(first));
    let mut segments = 0;
    for p in points {
        data = data.line_to(frame.point(p));
        segments += 1;
    }
    if segments == 0 {
        return String::new();
    }
    if closed {
        data = data.close();
    }
    String::from(Value::from(data))
}

fn stroke(d: String, color: &str, width: f64) -> Path {
    Path::new()
        .set("d", d)
        .set("fill", "none")
        .set("stroke", color)
        .set("stroke-width", width)
}

/// Serialize a field overview into an SVG document string.
///
/// Layers, bottom to top: mapping patches (`<g id="patches">`),
/// boundary rings (`<g id="boundary">`), strips (`<g id="strips">`)
/// and the guide line (`<g id="guide-line">`). An empty scene yields a
/// valid document whose `viewBox` is just the margin around the origin.
#[must_use]
pub fn to_svg(scene: &FieldScene<'_>, metadata: &SvgMetadata<'_>) -> String {
    let bounds = scene
        .bounds()
        .unwrap_or_else(|| Bounds::new(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)))
        .padded(MARGIN_M);
    let frame = Frame {
        min_easting: bounds.min.easting,
        max_northing: bounds.max.northing,
    };
    let (width, height) = (bounds.width(), bounds.height());

    let mut doc = Document::new()
        .set("width", format!("{width}m"))
        .set("height", format!("{height}m"))
        .set("viewBox", (0.0, 0.0, width, height))
        .set("preserveAspectRatio", "xMidYMid meet");

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("swath:config");
        config_el.assign("xmlns:swath", "https://swath-rs.github.io/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    let mut patches = Group::new().set("id", "patches");
    for patch in scene.patches.iter().filter(|p| p.has_area()) {
        let d = path_data(frame, patch.outline(), true);
        if d.is_empty() {
            continue;
        }
        let color = PATCH_COLORS[patch.color % PATCH_COLORS.len()];
        patches = patches.add(
            Path::new()
                .set("d", d)
                .set("fill", color)
                .set("fill-opacity", 0.6)
                .set("stroke", "none"),
        );
    }
    doc = doc.add(patches);

    let mut rings = Group::new().set("id", "boundary");
    if let Some(boundary) = scene.boundary {
        let outer = boundary.outer().points().iter().map(|p| p.position());
        rings = rings.add(stroke(path_data(frame, outer, true), "black", 0.5));
        for ring in boundary.inner() {
            let inner = ring.points().iter().map(|p| p.position());
            rings = rings.add(stroke(path_data(frame, inner, true), "#6d4c41", 0.5));
        }
        if let Some(headland) = boundary.headland() {
            let line = headland.points().iter().map(|p| p.position());
            rings = rings.add(
                stroke(path_data(frame, line, true), "#fb8c00", 0.3)
                    .set("stroke-dasharray", "2 1"),
            );
        }
    }
    doc = doc.add(rings);

    let mut strips = Group::new().set("id", "strips");
    for (index, strip) in scene.strips.iter().enumerate() {
        let d = path_data(frame, strip.points().iter().map(|p| p.position()), false);
        if d.is_empty() {
            continue;
        }
        strips = strips.add(stroke(d, "#1e88e5", 0.3).set("data-strip", index.to_string()));
    }
    doc = doc.add(strips);

    let guide = path_data(frame, scene.guide_line.iter().map(|p| p.position()), false);
    let mut guide_group = Group::new().set("id", "guide-line");
    if !guide.is_empty() {
        guide_group = guide_group.add(stroke(guide, "#e53935", 0.4));
    }
    doc = doc.add(guide_group);

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
