//! Validate → decode → assemble → tone-map → encode.
//!
//! [`Pipeline`] is the unit of work shared by the streaming and unary
//! adapters. It holds only read-only configuration, so one instance is
//! shared by every session.

use std::{fmt, sync::Arc, time::Instant};

use tracing::{debug, error, info, warn};

use crate::{
    assemble::assemble,
    decode::{DecodedPlanes, PlaneDecoder},
    encode::{EncodeError, encode_png},
    error::ProcessError,
    tonemap::{ToneMapParams, tone_map},
    validate::validate_bytes,
};

/// Encoded PNG together with its dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Converted {
    /// PNG bytes.
    pub png: Vec<u8>,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

/// Conversion pipeline bound to a decoder and tone-mapping parameters.
#[derive(Clone)]
pub struct Pipeline {
    decoder: Arc<dyn PlaneDecoder>,
    params: ToneMapParams,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline using `decoder` with default tone-mapping parameters.
    #[must_use]
    pub fn new(decoder: impl PlaneDecoder) -> Self { Self::from_arc(Arc::new(decoder)) }

    /// Pipeline sharing an existing decoder.
    #[must_use]
    pub fn from_arc(decoder: Arc<dyn PlaneDecoder>) -> Self {
        Self {
            decoder,
            params: ToneMapParams::default(),
        }
    }

    /// Replace the tone-mapping parameters.
    #[must_use]
    pub fn with_params(mut self, params: ToneMapParams) -> Self {
        self.params = params;
        self
    }

    /// Tone-mapping parameters in use.
    #[must_use]
    pub const fn params(&self) -> &ToneMapParams { &self.params }

    /// Convert one complete EXR payload to PNG.
    ///
    /// Steps run strictly in sequence. The CPU-bound tail (assembly, tone
    /// mapping and encoding) runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessError`] describing the first failing step.
    pub async fn process(&self, bytes: &[u8]) -> Result<Converted, ProcessError> {
        let started = Instant::now();
        let outcome = self.run(bytes).await;
        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            Ok(converted) => info!(
                width = converted.width,
                height = converted.height,
                input_bytes = bytes.len(),
                png_bytes = converted.png.len(),
                elapsed_ms,
                "conversion complete"
            ),
            Err(e @ (ProcessError::InvalidInput(_) | ProcessError::EmptyPayload)) => {
                warn!(kind = e.kind(), error = %e, elapsed_ms, "conversion rejected");
            }
            Err(e) => error!(kind = e.kind(), error = %e, elapsed_ms, "conversion failed"),
        }
        if let Err(e) = &outcome {
            crate::metrics::inc_failures(e.kind());
        }
        outcome
    }

    async fn run(&self, bytes: &[u8]) -> Result<Converted, ProcessError> {
        validate_bytes(bytes)?;
        let decoded = self.decoder.decode(bytes).await?;
        debug!(
            width = decoded.header.width,
            height = decoded.header.height,
            channels = ?decoded.header.channels,
            "decoded planes"
        );
        let params = self.params;
        let rendered = tokio::task::spawn_blocking(move || render(&decoded, &params))
            .await
            .map_err(EncodeError::from)??;
        Ok(rendered)
    }
}

fn render(decoded: &DecodedPlanes, params: &ToneMapParams) -> Result<Converted, EncodeError> {
    let raster = tone_map(&assemble(decoded), params);
    let png = encode_png(&raster)?;
    Ok(Converted {
        png,
        width: raster.width(),
        height: raster.height(),
    })
}
