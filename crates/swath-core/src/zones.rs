//! Mapping patches recorded per zone of adjacent sections.
//!
//! A zone is a run of sections whose mapping is on. Each zone draws a
//! [`MappingPatch`], a triangle strip of alternating left and right edge
//! points, and every new point pair after the first emits the
//! [`CoverageQuad`] swept since the previous pair. The patches are
//! re-partitioned only when the mapping mask changes.

use log::info;
use serde::{Deserialize, Serialize};

use crate::coverage::CoverageQuad;
use crate::geometry::Point2;

/// Quads smaller than this are not emitted, m².
const MIN_QUAD_AREA: f64 = 1e-9;

/// More zones than this always reopen patches on a mask change.
const MAX_RESIZE_ZONES: usize = 2;

/// A recorded triangle strip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingPatch {
    /// Section index whose colour the patch is drawn in; always 0 unless
    /// sections are recorded individually.
    pub color: usize,
    /// Alternating left and right edge points.
    pub vertices: Vec<Point2>,
}

impl MappingPatch {
    #[must_use]
    pub const fn new(color: usize) -> Self {
        Self {
            color,
            vertices: Vec::new(),
        }
    }

    /// Closed outline: left edge forwards, then right edge backwards.
    #[must_use]
    pub fn outline(&self) -> Vec<Point2> {
        let lefts = self.vertices.iter().step_by(2);
        let rights = self.vertices.iter().skip(1).step_by(2).rev();
        lefts.chain(rights).copied().collect()
    }

    /// Whether the strip holds at least one quad.
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.vertices.len() >= 4
    }
}

/// What happened to a zone slot during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneEvent {
    /// A new patch started over sections `first..=last`.
    Opened { slot: usize, first: usize, last: usize },
    /// A drawing patch now spans sections `first..=last`.
    Resized { slot: usize, first: usize, last: usize },
    /// A patch stopped drawing; `kept` when it held any area.
    Closed { slot: usize, kept: bool },
}

/// Geometry and events produced by one update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneUpdate {
    pub quads: Vec<CoverageQuad>,
    pub events: Vec<ZoneEvent>,
}

#[derive(Debug, Clone, Default)]
struct ZoneSlot {
    drawing: bool,
    current: (usize, usize),
    next: (usize, usize),
    patch: MappingPatch,
    touched: bool,
}

impl ZoneSlot {
    /// Append the zone's edge pair; returns the swept quad once the
    /// strip holds two pairs.
    fn add_point(&mut self, edges: &[(Point2, Point2)]) -> Option<CoverageQuad> {
        self.touched = true;
        let (first, last) = self.current;
        let left = edges.get(first)?.0;
        let right = edges.get(last)?.1;
        let v = &mut self.patch.vertices;
        v.push(left);
        v.push(right);
        let n = v.len();
        (n >= 4).then(|| CoverageQuad {
            left,
            right,
            prev_left: v[n - 4],
            prev_right: v[n - 3],
        })
    }

    fn turn_on(&mut self, color: usize, edges: &[(Point2, Point2)]) -> bool {
        if self.drawing {
            return false;
        }
        self.drawing = true;
        self.patch = MappingPatch::new(color);
        // First pair of a fresh strip never forms a quad.
        let _ = self.add_point(edges);
        true
    }

    /// Add a closing point and stop drawing. Returns the final quad and
    /// the finished patch.
    fn turn_off(&mut self, edges: &[(Point2, Point2)]) -> (Option<CoverageQuad>, MappingPatch) {
        let quad = self.add_point(edges);
        self.drawing = false;
        (quad, std::mem::take(&mut self.patch))
    }
}

/// Maintains one mapping patch per zone and the total worked area.
#[derive(Debug, Clone, Default)]
pub struct ZoneRecorder {
    slots: Vec<ZoneSlot>,
    completed: Vec<MappingPatch>,
    last_mask: u64,
    worked_area: f64,
}

impl ZoneRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every emitted quad's area, m².
    #[must_use]
    pub const fn worked_area(&self) -> f64 {
        self.worked_area
    }

    /// Mapping mask seen by the last update.
    #[must_use]
    pub const fn last_mask(&self) -> u64 {
        self.last_mask
    }

    /// Patches that stopped drawing and held area.
    #[must_use]
    pub fn completed_patches(&self) -> &[MappingPatch] {
        &self.completed
    }

    /// Patches still drawing.
    pub fn active_patches(&self) -> impl Iterator<Item = &MappingPatch> {
        self.slots.iter().filter(|s| s.drawing).map(|s| &s.patch)
    }

    /// Number of patches still drawing.
    #[must_use]
    pub fn drawing_count(&self) -> usize {
        self.slots.iter().filter(|s| s.drawing).count()
    }

    /// Apply the mapping mask for one tick.
    ///
    /// `edges` holds the world left and right edge points of every
    /// section, left to right. Mask bits beyond `edges` are ignored.
    pub fn update(&mut self, mask: u64, multi_colored: bool, edges: &[(Point2, Point2)]) -> ZoneUpdate {
        let mut out = ZoneUpdate::default();
        for slot in &mut self.slots {
            slot.touched = false;
        }

        if mask != self.last_mask {
            if mask == 0 {
                self.close_drawing(edges, &mut out);
            } else if multi_colored {
                self.repartition_individual(mask, edges, &mut out);
            } else {
                self.repartition_merged(mask, edges, &mut out);
            }
            self.last_mask = mask;
        }

        for i in 0..self.slots.len() {
            if self.slots[i].drawing && !self.slots[i].touched {
                let quad = self.slots[i].add_point(edges);
                self.emit(quad, &mut out);
            }
        }
        out
    }

    /// Stop every drawing patch, for example at the end of a session.
    pub fn close_all(&mut self, edges: &[(Point2, Point2)]) -> ZoneUpdate {
        let mut out = ZoneUpdate::default();
        self.close_drawing(edges, &mut out);
        self.last_mask = 0;
        out
    }

    /// Forget every patch and the worked area.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn emit(&mut self, quad: Option<CoverageQuad>, out: &mut ZoneUpdate) {
        if let Some(quad) = quad {
            let area = quad.area();
            if area > MIN_QUAD_AREA {
                self.worked_area += area;
                out.quads.push(quad);
            }
        }
    }

    fn close_slot(&mut self, slot: usize, edges: &[(Point2, Point2)], out: &mut ZoneUpdate) {
        let (quad, patch) = self.slots[slot].turn_off(edges);
        self.emit(quad, out);
        let kept = patch.has_area();
        if kept {
            self.completed.push(patch);
        }
        out.events.push(ZoneEvent::Closed { slot, kept });
    }

    fn close_drawing(&mut self, edges: &[(Point2, Point2)], out: &mut ZoneUpdate) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].drawing {
                self.close_slot(slot, edges, out);
            }
        }
    }

    fn ensure_slots(&mut self, count: usize) {
        if self.slots.len() < count {
            self.slots.resize_with(count, ZoneSlot::default);
        }
    }

    fn repartition_merged(&mut self, mask: u64, edges: &[(Point2, Point2)], out: &mut ZoneUpdate) {
        let zones = mapping_runs(mask, edges.len());
        self.ensure_slots(zones.len());
        for (slot, &zone) in self.slots.iter_mut().zip(&zones) {
            slot.next = zone;
        }

        let in_place = self.drawing_count() == zones.len()
            && zones.len() <= MAX_RESIZE_ZONES
            && self.slots[..zones.len()].iter().all(|s| {
                s.drawing && s.next.0 <= s.current.1 && s.next.1 >= s.current.0
            });

        if in_place {
            for slot in 0..zones.len() {
                if self.slots[slot].next == self.slots[slot].current {
                    continue;
                }
                let before = self.slots[slot].add_point(edges);
                self.emit(before, out);
                let (first, last) = self.slots[slot].next;
                self.slots[slot].current = (first, last);
                let after = self.slots[slot].add_point(edges);
                self.emit(after, out);
                out.events.push(ZoneEvent::Resized { slot, first, last });
            }
        } else {
            self.close_drawing(edges, out);
            for slot in 0..zones.len() {
                let (first, last) = self.slots[slot].next;
                self.slots[slot].current = (first, last);
                if self.slots[slot].turn_on(0, edges) {
                    out.events.push(ZoneEvent::Opened { slot, first, last });
                }
            }
        }
        info!(
            "[Zones] mask {mask:#b}: {} zone(s), {}",
            zones.len(),
            if in_place { "resized" } else { "reopened" }
        );
    }

    fn repartition_individual(&mut self, mask: u64, edges: &[(Point2, Point2)], out: &mut ZoneUpdate) {
        self.ensure_slots(edges.len());
        for j in 0..edges.len() {
            self.slots[j].next = (j, j);
            if mask & (1 << j) == 0 {
                if self.slots[j].drawing {
                    self.close_slot(j, edges, out);
                }
            } else {
                self.slots[j].current = (j, j);
                if self.slots[j].turn_on(j, edges) {
                    out.events.push(ZoneEvent::Opened {
                        slot: j,
                        first: j,
                        last: j,
                    });
                }
            }
        }
        info!("[Zones] mask {mask:#b}: individual sections");
    }
}

/// Maximal runs of set bits among the low `count` bits of `mask`, as
/// inclusive `(first, last)` section ranges.
#[must_use]
pub fn mapping_runs(mask: u64, count: usize) -> Vec<(usize, usize)> {
    let count = count.min(64);
    let on = |j: usize| mask & (1 << j) != 0;
    let mut runs = Vec::new();
    let mut j = 0;
    while j < count {
        if on(j) {
            let first = j;
            while j + 1 < count && on(j + 1) {
                j += 1;
            }
            runs.push((first, j));
        }
        j += 1;
    }
    runs
}
