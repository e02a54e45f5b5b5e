//! Decoder isolation boundary.
//!
//! EXR decoding runs in a separate process (see [`SubprocessDecoder`]) so a
//! crash or hang on hostile input cannot take the serving process down. The
//! child side lives in [`worker`]; the two halves exchange a bincode-encoded
//! [`DecodedPlanes`] over the child's stdout.

use std::{io, process::ExitStatus, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

mod gate;
pub mod worker;

pub use gate::SubprocessDecoder;

/// Header metadata reported by the decoder.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    /// Width of the data window in pixels.
    pub width: u32,
    /// Height of the data window in pixels.
    pub height: u32,
    /// Channel names in file order.
    pub channels: Vec<String>,
}

/// One named channel converted to `f32`, row-major.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq)]
pub struct ChannelPlane {
    /// Channel name as stored in the file (for example `R` or `Y`).
    pub name: String,
    /// Samples in row-major order.
    pub samples: Vec<f32>,
}

/// Decoder output: header plus every channel plane.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq)]
pub struct DecodedPlanes {
    /// Header metadata.
    pub header: ImageHeader,
    /// Channel planes in file order.
    pub planes: Vec<ChannelPlane>,
}

impl DecodedPlanes {
    /// Look up a plane by exact name.
    #[must_use]
    pub fn plane(&self, name: &str) -> Option<&ChannelPlane> {
        self.planes.iter().find(|p| p.name == name)
    }
}

/// Ways the isolated decode can fail.
#[derive(Debug, Error)]
pub enum DecodeFailure {
    /// The decoder ran to completion and rejected the file.
    #[error("decoder rejected file: {reason}")]
    Rejected {
        /// Diagnostic text captured from the decoder.
        reason: String,
    },
    /// The decoder did not finish within the wall-clock limit.
    #[error("decode timed out after {}s", .after.as_secs_f32())]
    TimedOut {
        /// Limit that elapsed.
        after: Duration,
    },
    /// The decoder process terminated abnormally.
    #[error("decoder crashed ({status}): {diagnostics}")]
    Crashed {
        /// Exit status of the child.
        status: ExitStatus,
        /// Diagnostic text captured from the child.
        diagnostics: String,
    },
    /// The payload could not be written to a transient file.
    #[error("failed to materialise payload: {0}")]
    Materialise(#[source] io::Error),
    /// The decoder process could not be started or awaited.
    #[error("failed to run decoder: {0}")]
    Spawn(#[source] io::Error),
    /// The decoder exited cleanly but its output could not be parsed.
    #[error("decoder produced malformed output: {0}")]
    MalformedOutput(#[source] bincode::error::DecodeError),
}

impl DecodeFailure {
    /// Whether the failure reflects the input rather than the decoder unit.
    #[must_use]
    pub const fn is_input_rejection(&self) -> bool { matches!(self, Self::Rejected { .. }) }
}

/// Source of decoded channel planes for validated EXR bytes.
#[async_trait]
pub trait PlaneDecoder: Send + Sync + 'static {
    /// Decode `bytes` into named `f32` planes.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeFailure`] describing why no planes were produced.
    async fn decode(&self, bytes: &[u8]) -> Result<DecodedPlanes, DecodeFailure>;
}
