//! Length-delimited bincode framing.

use std::{io, marker::PhantomData};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::message::Message;

/// Frame limit meaning "no application-level limit".
///
/// The 4-byte length prefix still caps a single frame at `u32::MAX` bytes.
pub const UNLIMITED_MESSAGE_SIZE: usize = usize::MAX;

/// Codec decoding `In` messages and encoding `Out` messages.
///
/// Uses a 4-byte big-endian length prefix (`tokio_util` default) around a
/// bincode body. Malformed bodies surface as [`io::ErrorKind::InvalidData`].
#[derive(Debug)]
pub struct MessageCodec<In, Out> {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> MessageCodec<In, Out> {
    /// Codec accepting frames up to `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_length)
                .new_codec(),
            max_frame_length,
            _marker: PhantomData,
        }
    }

    /// Maximum frame length accepted by this codec.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl<In, Out> Default for MessageCodec<In, Out> {
    fn default() -> Self { Self::new(UNLIMITED_MESSAGE_SIZE) }
}

impl<In, Out> Clone for MessageCodec<In, Out> {
    fn clone(&self) -> Self { Self::new(self.max_frame_length) }
}

impl<In: Message, Out> Decoder for MessageCodec<In, Out> {
    type Item = In;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let (message, consumed) = In::from_bytes(&frame).map_err(invalid_data)?;
        if consumed != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "trailing bytes after message: consumed {consumed} of {}",
                    frame.len()
                ),
            ));
        }
        Ok(Some(message))
    }
}

impl<In, Out: Message> Encoder<Out> for MessageCodec<In, Out> {
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.to_bytes().map_err(invalid_data)?;
        self.inner.encode(Bytes::from(body), dst)
    }
}

fn invalid_data(error: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}
