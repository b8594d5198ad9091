//! swath-core: Contour guidance, section control and coverage tracking
//! (sans-IO).
//!
//! Turns a stream of vehicle poses into steering commands and a record
//! of covered ground:
//!
//! - [`contour`]: records driven passes and builds a guide line one
//!   implement width beside the nearest one;
//! - [`steering`]: pure-pursuit and Stanley control laws;
//! - [`section`]: per-section on/off and mapping state machines;
//! - [`zones`]: mapping patches for runs of adjacent sections;
//! - [`coverage`] and [`raster`]: two coverage engines with overlap
//!   statistics.
//!
//! [`GuidanceSession`] wires them together, one tick at a time.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! data and returns structured results. Persistence goes through the
//! [`StripStore`] seam and rendering lives in `swath-export`.

pub mod boundary;
pub mod config;
pub mod contour;
pub mod coverage;
pub mod diagnostics;
pub mod geometry;
pub mod overlap;
pub mod raster;
pub mod section;
pub mod session;
pub mod steering;
pub mod store;
pub mod timer;
pub mod zones;

pub use boundary::{BoundaryQuery, FieldBoundary, Polygon};
pub use config::{
    CoverageConfig, EngineConfig, EngineError, GuidanceConfig, MAX_SECTIONS, ToolConfig,
    VehicleConfig,
};
pub use contour::{ContourEngine, GuideLineOutcome, Strip, StripOutcome};
pub use coverage::{CoverageEngine, CoverageGrid, CoverageQuad};
pub use diagnostics::SessionDiagnostics;
pub use geometry::{Bounds, Point2, Point3};
pub use overlap::OverlapStats;
pub use raster::{FillRule, RasterStats, TriangleRasterizer};
pub use section::{SectionController, SectionMode};
pub use session::{GuidanceSession, TickInputs, TickReport};
pub use steering::{GuidanceOutput, SteeringLaw, SteeringLawKind};
pub use store::{MemoryStripStore, StoreError, StripStore};
pub use timer::{TickRate, TicksRemaining};
pub use zones::{MappingPatch, ZoneRecorder};
