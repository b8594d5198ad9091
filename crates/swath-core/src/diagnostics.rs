//! Session diagnostics: counts and coverage statistics for a run.
//!
//! Collected by [`GuidanceSession::diagnostics`](crate::GuidanceSession::diagnostics)
//! on demand; nothing here is updated per tick except the counters the
//! session already keeps.

use serde::{Deserialize, Serialize};

use crate::overlap::OverlapStats;
use crate::raster::{FillRule, RasterStats};

/// Snapshot of a guidance session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    /// Ticks run so far.
    pub ticks: u64,
    /// Sealed strips.
    pub strips: usize,
    /// Points across all sealed strips.
    pub strip_points: usize,
    /// Whether a strip is being recorded.
    pub recording: bool,
    /// Whether guidance is locked to a strip.
    pub locked: bool,
    /// Points in the current guide line.
    pub guide_points: usize,
    /// Area of all mapped quads, m².
    pub worked_area: f64,
    /// Finished patches holding area.
    pub patches: usize,
    /// Field area inside the boundary, when one is loaded, m².
    pub field_area: Option<f64>,
    /// Coverage grid statistics.
    pub grid: Option<OverlapStats>,
    /// Triangle rasterizer statistics.
    pub raster: Option<RasterStats>,
    /// Span rule the rasterizer used.
    pub fill_rule: FillRule,
    /// Ticks with a valid steering output.
    pub guided_ticks: u64,
    /// Ticks each section spent actuated.
    pub section_on_ticks: Vec<u64>,
}

impl SessionDiagnostics {
    /// Fraction of ticks with a valid steering output.
    #[must_use]
    pub fn steering_availability(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.guided_ticks as f64 / self.ticks as f64;
        ratio
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Guidance Session Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Ticks: {}  |  Guided: {} ({:.1}%)",
            self.ticks,
            self.guided_ticks,
            self.steering_availability() * 100.0,
        ));
        lines.push(format!(
            "Strips: {} ({} points){}{}",
            self.strips,
            self.strip_points,
            if self.recording { "  |  recording" } else { "" },
            if self.locked { "  |  locked" } else { "" },
        ));
        lines.push(format!("Guide line: {} points", self.guide_points));
        lines.push(String::new());

        lines.push(format!(
            "Worked area: {:.2} m²  |  Patches: {}",
            self.worked_area, self.patches
        ));
        if let Some(area) = self.field_area {
            lines.push(format!("Field area: {area:.2} m²"));
        }
        lines.push(format!("{:<24} {:>14} {:>10}", "Engine", "Covered m²", "Overlap"));
        lines.push("-".repeat(50));
        lines.push(format_engine("Grid", self.grid.as_ref()));
        lines.push(format_engine(
            &format!("Raster ({:?})", self.fill_rule),
            self.raster.as_ref().map(|r| &r.stats),
        ));
        if let Some(raster) = &self.raster {
            lines.push(format!(
                "Raster pixels touched: {}  |  max passes: {}",
                raster.non_zero, raster.max_coverage
            ));
        }
        lines.push(String::new());

        let sections: Vec<String> = self
            .section_on_ticks
            .iter()
            .enumerate()
            .map(|(j, on)| format!("{j}:{on}"))
            .collect();
        lines.push(format!("Section on-ticks: {}", sections.join(" ")));

        lines.join("\n")
    }
}

fn format_engine(name: &str, stats: Option<&OverlapStats>) -> String {
    stats.map_or_else(
        || format!("{name:<24} {:>14} {:>10}", "-", "-"),
        |s| {
            format!(
                "{name:<24} {:>14.2} {:>9.2}%",
                s.actual_area_covered, s.overlap_percent
            )
        },
    )
}
