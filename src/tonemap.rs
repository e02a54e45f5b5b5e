//! Global Reinhard tone mapping from HDR floats to an 8-bit RGB raster.
//!
//! The operator works on luminance: every pixel is scaled by
//! `Ld / (L + eps)`, where `Ld` is the Reinhard-compressed luminance after
//! normalising by the log-average luminance of the whole image. The result
//! is optionally sRGB-encoded and quantised with round-half-to-even.
//!
//! The mapping is deterministic: the same image and parameters always give
//! byte-identical output.

use crate::assemble::HdrImage;

/// Offset protecting logarithms and divisions from zero luminance.
const EPS: f32 = 1e-6;

/// Replacement for `+inf` and upper clamp for scaled samples.
const HDR_CEILING: f32 = 1e6;

/// Rec. 709 luminance weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Parameters of the tone-mapping operator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneMapParams {
    /// Exposure adjustment in stops, applied as `2^exposure_ev`.
    pub exposure_ev: f32,
    /// Reinhard key value (middle grey target).
    pub key: f32,
    /// Apply the sRGB transfer function before quantising.
    pub srgb: bool,
}

impl Default for ToneMapParams {
    fn default() -> Self {
        Self {
            exposure_ev: 0.0,
            key: 0.18,
            srgb: true,
        }
    }
}

/// 8-bit RGB raster, row-major, three bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 { self.width }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 { self.height }

    /// Interleaved RGB bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] { &self.data }

    /// RGB bytes of the pixel at (`x`, `y`), if in bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(offset..offset + 3)
            .and_then(|px| <[u8; 3]>::try_from(px).ok())
    }
}

/// Tone-map `image` into an 8-bit raster.
#[must_use]
pub fn tone_map(image: &HdrImage, params: &ToneMapParams) -> Raster {
    let gain = params.exposure_ev.exp2();
    let exposed: Vec<[f32; 3]> = image
        .pixels()
        .iter()
        .map(|px| px.map(|c| sanitize_scaled(c * gain)))
        .collect();
    let luminance: Vec<f32> = exposed.iter().map(|px| luminance(*px)).collect();

    let log_average = log_average(&luminance);
    let normaliser = params.key / (log_average + EPS);

    let mut data = Vec::with_capacity(exposed.len() * 3);
    for (px, &lum) in exposed.iter().zip(&luminance) {
        let scaled = normaliser * lum;
        let compressed = scaled / (1.0 + scaled);
        let factor = compressed / (lum + EPS);
        for channel in px {
            let mut value = (channel * factor).clamp(0.0, 1.0);
            if params.srgb {
                value = srgb_oetf(value).clamp(0.0, 1.0);
            }
            data.push(quantize(value));
        }
    }

    Raster {
        width: image.width(),
        height: image.height(),
        data,
    }
}

/// Replace NaN and `-inf` with zero, `+inf` with the ceiling, then clamp.
fn sanitize_scaled(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, HDR_CEILING)
    }
}

fn luminance(px: [f32; 3]) -> f32 {
    let lum = LUMA[0] * px[0] + LUMA[1] * px[1] + LUMA[2] * px[2];
    lum.clamp(0.0, HDR_CEILING)
}

/// `exp(mean(ln(eps + L)))`, with non-finite log terms counted as zero.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "the mean is accumulated in f64 and narrowed once"
)]
fn log_average(luminance: &[f32]) -> f32 {
    if luminance.is_empty() {
        return 0.0;
    }
    let sum: f64 = luminance
        .iter()
        .map(|&lum| {
            let term = (EPS + lum).ln();
            if term.is_finite() { f64::from(term) } else { 0.0 }
        })
        .sum();
    (sum / luminance.len() as f64).exp() as f32
}

/// sRGB OETF (IEC 61966-2-1): linear `[0, 1]` to encoded `[0, 1]`.
#[inline]
#[must_use]
pub fn srgb_oetf(linear: f32) -> f32 {
    if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to [0, 1] so the scaled result fits in u8"
)]
fn quantize(value: f32) -> u8 { (value * 255.0).round_ties_even() as u8 }
