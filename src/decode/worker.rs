//! Child side of the decoder isolation boundary.
//!
//! The binary's hidden `decode-worker` subcommand calls [`run`] with the path
//! of a staged file. Nothing here is meant to run inside the serving process.

use std::{
    io::{self, Write},
    path::Path,
    process::ExitCode,
};

use exr::prelude::{FlatSamples, ReadChannels, ReadLayers, Vec2, f16};
use thiserror::Error;

use super::{ChannelPlane, DecodedPlanes, ImageHeader};
use crate::{
    message::Message,
    validate::{ValidationError, validate_path},
};

/// Subcommand name the parent passes to re-execute the binary as a worker.
pub const WORKER_SUBCOMMAND: &str = "decode-worker";

/// Exit code signalling that the file was rejected rather than the worker
/// failing.
pub const REJECTED_EXIT_CODE: u8 = 3;

/// Largest width or height accepted from a data window.
const MAX_DIMENSION: usize = 65_535;

/// Reasons the worker refuses a file.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The staged file failed pre-decode validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The EXR reader failed.
    #[error("failed to read EXR: {0}")]
    Exr(#[from] exr::error::Error),
    /// The data window is empty or absurdly large.
    #[error("implausible data window {width}x{height}")]
    Dimensions {
        /// Reported width.
        width: usize,
        /// Reported height.
        height: usize,
    },
    /// The first valid layer carries no channels.
    #[error("file has no channels")]
    NoChannels,
}

/// Decode the first valid layer of `path` into `f32` planes.
///
/// # Errors
///
/// Returns a [`WorkerError`] if validation or decoding fails, or if the data
/// window or channel list is implausible.
pub fn decode_file(path: &Path) -> Result<DecodedPlanes, WorkerError> {
    validate_path(path)?;
    let image = exr::prelude::read()
        .no_deep_data()
        .largest_resolution_level()
        .all_channels()
        .first_valid_layer()
        .all_attributes()
        .from_file(path)?;

    let layer = image.layer_data;
    let Vec2(width, height) = layer.size;
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(WorkerError::Dimensions { width, height });
    }
    if layer.channel_data.list.is_empty() {
        return Err(WorkerError::NoChannels);
    }

    let planes: Vec<ChannelPlane> = layer
        .channel_data
        .list
        .into_iter()
        .map(|channel| ChannelPlane {
            name: channel.name.to_string(),
            samples: samples_to_f32(channel.sample_data),
        })
        .collect();
    let header = ImageHeader {
        // Both dimensions are bounded by MAX_DIMENSION above.
        width: u32::try_from(width).unwrap_or(u32::MAX),
        height: u32::try_from(height).unwrap_or(u32::MAX),
        channels: planes.iter().map(|p| p.name.clone()).collect(),
    };
    Ok(DecodedPlanes { header, planes })
}

#[expect(
    clippy::cast_precision_loss,
    reason = "u32 samples are widened to f32 like every other channel type"
)]
fn samples_to_f32(samples: FlatSamples) -> Vec<f32> {
    match samples {
        FlatSamples::F16(values) => values.into_iter().map(f16::to_f32).collect(),
        FlatSamples::F32(values) => values,
        FlatSamples::U32(values) => values.into_iter().map(|v| v as f32).collect(),
    }
}

/// Worker entry point: decode `path` and write the planes to stdout.
///
/// Rejections are printed to stderr and exit with [`REJECTED_EXIT_CODE`];
/// output failures exit with a generic failure code.
#[must_use]
pub fn run(path: &Path) -> ExitCode {
    let planes = match decode_file(path) {
        Ok(planes) => planes,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(REJECTED_EXIT_CODE);
        }
    };
    match write_planes(&planes) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("failed to write decoded planes: {e}");
            ExitCode::FAILURE
        }
    }
}

fn write_planes(planes: &DecodedPlanes) -> io::Result<()> {
    let bytes = planes.to_bytes().map_err(io::Error::other)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()
}
