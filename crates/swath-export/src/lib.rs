//! swath-export: Pure format serializers for field data (sans-IO)
//!
//! Renders a session's geometry as an SVG overview and its coverage
//! counters as grayscale PNG maps. Every function returns bytes or a
//! string; writing them anywhere is up to the caller.

pub mod png;
pub mod svg;

pub use png::{coverage_png, raster_png, shade};
pub use svg::{FieldScene, SvgMetadata, to_svg};

/// Errors raised while encoding an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(String),

    /// The map is larger than the encoder can address.
    #[error("map of {columns}x{rows} cells is too large to encode")]
    TooLarge { columns: usize, rows: usize },

    /// There is nothing to encode.
    #[error("map has no cells")]
    Empty,
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        Self::PngEncode(err.to_string())
    }
}
