//! PNG encoding of tone-mapped rasters.

use image::{ExtendedColorType, ImageEncoder, ImageError, codecs::png::PngEncoder};
use thiserror::Error;

use crate::tonemap::Raster;

/// PNG signature, useful for callers sniffing output.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Failure to produce a PNG from a raster.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The raster has a zero dimension.
    #[error("cannot encode an empty {width}x{height} raster")]
    Empty {
        /// Raster width.
        width: u32,
        /// Raster height.
        height: u32,
    },
    /// The PNG encoder failed.
    #[error("png encoding failed: {0}")]
    Png(#[from] ImageError),
    /// The blocking render task was cancelled or panicked.
    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Encode `raster` as an 8-bit RGB PNG.
///
/// # Errors
///
/// Returns [`EncodeError::Empty`] for zero-area rasters and
/// [`EncodeError::Png`] if the encoder rejects the data.
pub fn encode_png(raster: &Raster) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = (raster.width(), raster.height());
    if width == 0 || height == 0 {
        return Err(EncodeError::Empty { width, height });
    }
    let mut out = Vec::with_capacity(raster.data().len() / 2 + 64);
    PngEncoder::new(&mut out).write_image(raster.data(), width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}
