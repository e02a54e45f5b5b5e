//! Fixtures shared by unit tests.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    decode::{ChannelPlane, DecodeFailure, DecodedPlanes, ImageHeader, PlaneDecoder},
    pipeline::Pipeline,
    validate::EXR_MAGIC,
};

/// Payload with valid magic followed by attribute-like ASCII.
pub(crate) fn plausible_exr(len: usize) -> Vec<u8> {
    let mut bytes = EXR_MAGIC.to_vec();
    bytes.extend_from_slice(&[0x02, 0x00, 0x00, 0x00]);
    let attrs = b"channels\0chlist\0compression\0compression\0dataWindow\0box2i\0";
    bytes.extend(attrs.iter().cycle().take(len.saturating_sub(bytes.len())));
    bytes.truncate(len);
    bytes
}

/// Single luminance plane of constant `value`.
pub(crate) fn grey_planes(width: u32, height: u32, value: f32) -> DecodedPlanes {
    DecodedPlanes {
        header: ImageHeader {
            width,
            height,
            channels: vec!["Y".into()],
        },
        planes: vec![ChannelPlane {
            name: "Y".into(),
            samples: vec![value; width as usize * height as usize],
        }],
    }
}

/// Decoder returning a fixed grey image for any input.
pub(crate) struct GreyDecoder {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

#[async_trait]
impl PlaneDecoder for GreyDecoder {
    async fn decode(&self, _: &[u8]) -> Result<DecodedPlanes, DecodeFailure> {
        Ok(grey_planes(self.width, self.height, 0.18))
    }
}

/// Decoder rejecting every input.
pub(crate) struct RejectingDecoder;

#[async_trait]
impl PlaneDecoder for RejectingDecoder {
    async fn decode(&self, _: &[u8]) -> Result<DecodedPlanes, DecodeFailure> {
        Err(DecodeFailure::Rejected {
            reason: "no decodable channels".into(),
        })
    }
}

/// Decoder that never finishes within the configured limit.
pub(crate) struct StallingDecoder(pub(crate) Duration);

#[async_trait]
impl PlaneDecoder for StallingDecoder {
    async fn decode(&self, _: &[u8]) -> Result<DecodedPlanes, DecodeFailure> {
        Err(DecodeFailure::TimedOut { after: self.0 })
    }
}

/// Pipeline over a [`GreyDecoder`].
pub(crate) fn grey_pipeline(width: u32, height: u32) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(GreyDecoder { width, height }))
}
