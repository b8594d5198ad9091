//! Coverage counters as 8-bit grayscale PNGs.
//!
//! Both coverage engines store counters row-major from the southern
//! edge. Images are written north-up, so rows are emitted in reverse.
//! Untouched ground is white and every extra pass darkens the cell.

use image::ImageEncoder;
use swath_core::{CoverageGrid, TriangleRasterizer};

use crate::ExportError;

/// Gray level for a counter: white for 0, black from 4 passes on.
#[must_use]
pub const fn shade(count: u8) -> u8 {
    match count {
        0 => 255,
        1 => 170,
        2 => 100,
        3 => 40,
        _ => 0,
    }
}

/// Encode the grid's pass counters.
///
/// # Errors
///
/// Returns [`ExportError::Empty`] for a grid without cells,
/// [`ExportError::TooLarge`] if a dimension exceeds `u32`, and
/// [`ExportError::PngEncode`] if encoding fails.
pub fn coverage_png(grid: &CoverageGrid) -> Result<Vec<u8>, ExportError> {
    encode_counters(grid.cells(), grid.columns(), grid.rows())
}

/// Encode the rasterizer's framebuffer.
///
/// # Errors
///
/// Same as [`coverage_png`].
pub fn raster_png(raster: &TriangleRasterizer) -> Result<Vec<u8>, ExportError> {
    encode_counters(raster.framebuffer(), raster.width(), raster.height())
}

fn encode_counters(cells: &[u8], columns: usize, rows: usize) -> Result<Vec<u8>, ExportError> {
    if columns == 0 || rows == 0 || cells.len() < columns * rows {
        return Err(ExportError::Empty);
    }
    let too_large = || ExportError::TooLarge { columns, rows };
    let width = u32::try_from(columns).map_err(|_| too_large())?;
    let height = u32::try_from(rows).map_err(|_| too_large())?;

    let pixels: Vec<u8> = cells[..columns * rows]
        .chunks_exact(columns)
        .rev()
        .flat_map(|row| row.iter().map(|&c| shade(c)))
        .collect();

    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(&pixels, width, height, image::ExtendedColorType::L8)?;
    Ok(png_bytes)
}
