//! Builds a three-channel HDR image from named decoder planes.
//!
//! Each of R, G and B is resolved independently: the uppercase name, then
//! the lowercase name, then a luminance plane (`Y`, then `y`), then zeros.
//! Planes whose sample count does not match the data window are ignored.
//! Non-finite samples are replaced with `0.0` afterwards, unconditionally.

use crate::decode::{ChannelPlane, DecodedPlanes};

/// Floating-point RGB image, row-major, one `[r, g, b]` triple per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct HdrImage {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 3]>,
}

impl HdrImage {
    /// Build an image from row-major pixels.
    ///
    /// Returns `None` if `pixels.len()` is not `width * height`.
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<[f32; 3]>) -> Option<Self> {
        (pixel_count(width, height) == pixels.len()).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image filled with a single colour.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [f32; 3]) -> Self {
        Self {
            width,
            height,
            pixels: vec![rgb; pixel_count(width, height)],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 { self.width }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 { self.height }

    /// Row-major pixels.
    #[must_use]
    pub fn pixels(&self) -> &[[f32; 3]] { &self.pixels }
}

fn pixel_count(width: u32, height: u32) -> usize { width as usize * height as usize }

/// Assemble and sanitise an RGB image from decoded planes.
#[must_use]
pub fn assemble(decoded: &DecodedPlanes) -> HdrImage {
    let (width, height) = (decoded.header.width, decoded.header.height);
    let len = pixel_count(width, height);

    let luminance = usable(decoded, "Y", len).or_else(|| usable(decoded, "y", len));
    let resolve = |upper, lower| {
        usable(decoded, upper, len)
            .or_else(|| usable(decoded, lower, len))
            .or(luminance)
    };
    let red = resolve("R", "r");
    let green = resolve("G", "g");
    let blue = resolve("B", "b");

    let pixels = (0..len)
        .map(|i| [sample(red, i), sample(green, i), sample(blue, i)])
        .collect();

    HdrImage {
        width,
        height,
        pixels,
    }
}

/// Plane named `name` whose sample count matches the data window.
fn usable<'a>(decoded: &'a DecodedPlanes, name: &str, len: usize) -> Option<&'a ChannelPlane> {
    decoded.plane(name).filter(|p| p.samples.len() == len)
}

fn sample(plane: Option<&ChannelPlane>, index: usize) -> f32 {
    plane.map_or(0.0, |p| finite_or_zero(p.samples[index]))
}

fn finite_or_zero(value: f32) -> f32 { if value.is_finite() { value } else { 0.0 } }
