//! Wire messages exchanged between clients and the conversion service.
//!
//! Every message travels in its own length-delimited frame (see
//! [`MessageCodec`]) and is encoded with bincode's standard configuration.
//! A connection carries a sequence of calls:
//!
//! - [`ClientMessage::HealthCheck`] → [`ServerMessage::Health`];
//! - [`ClientMessage::Convert`] → [`ServerMessage::Converted`] or
//!   [`ServerMessage::Rejected`];
//! - a streaming exchange: [`ClientMessage::StreamHeader`] and
//!   [`ClientMessage::StreamData`] frames closed by
//!   [`ClientMessage::StreamEnd`], answered by a sequence of
//!   [`ServerMessage::Stream`] frames.

use std::fmt;

mod codec;

pub use codec::{MessageCodec, UNLIMITED_MESSAGE_SIZE};

pub use crate::error::ErrorCategory;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "exr-extractor";

/// Phase reported in a [`ProcessingStatus`].
#[derive(bincode::Encode, bincode::Decode, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Inbound bytes are being accumulated.
    Receiving,
    /// The payload is being converted.
    Processing,
    /// Output frames are being sent.
    Sending,
    /// The exchange finished successfully.
    Complete,
    /// The exchange failed; nothing follows.
    Error,
}

impl StatusKind {
    /// Upper-case wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receiving => "RECEIVING",
            Self::Processing => "PROCESSING",
            Self::Sending => "SENDING",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Progress report emitted during a streaming exchange.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq)]
pub struct ProcessingStatus {
    /// Current phase.
    pub phase: StatusKind,
    /// Human-readable description.
    pub message: String,
    /// Fraction complete in `[0, 1]`.
    pub progress: f32,
}

impl ProcessingStatus {
    /// Build a status frame.
    #[must_use]
    pub fn new(phase: StatusKind, message: impl Into<String>, progress: f32) -> Self {
        Self {
            phase,
            message: message.into(),
            progress,
        }
    }
}

/// Dimensions and size of the encoded output, sent before its data frames.
#[derive(bincode::Encode, bincode::Decode, Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputHeader {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Total encoded length in bytes.
    pub total_size: u64,
}

/// Server-to-client frame of a streaming exchange.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq)]
pub enum OutboundFrame {
    /// Phase/progress report.
    Status(ProcessingStatus),
    /// Output header; exactly one per successful exchange.
    Header(OutputHeader),
    /// Slice of the encoded output.
    Data(Vec<u8>),
}

impl OutboundFrame {
    /// Whether this frame ends the exchange.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Status(ProcessingStatus {
                phase: StatusKind::Complete | StatusKind::Error,
                ..
            })
        )
    }
}

/// Metadata opening a streaming upload.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// Advisory label; never used to resolve paths.
    pub filename: String,
    /// Declared payload length, `0` when unknown.
    pub total_size: u64,
    /// Sender's chunk size, informational only.
    pub chunk_size_hint: u32,
}

/// Client-to-server frame of a streaming exchange, as seen by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// Upload metadata.
    Header(StreamHeader),
    /// Slice of the payload.
    Data(Vec<u8>),
}

/// Unary conversion request.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvertRequest {
    /// Complete EXR payload.
    pub exr_data: Vec<u8>,
}

/// Unary conversion result.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq, Eq)]
pub struct ConvertResponse {
    /// Encoded PNG.
    pub png_data: Vec<u8>,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Human-readable summary.
    pub message: String,
}

/// Unary failure.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Caller-visible classification.
    pub category: ErrorCategory,
    /// Description including the specific reason.
    pub message: String,
}

/// Health endpoint reply.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    /// Whether the service can accept work.
    pub healthy: bool,
    /// Service name, always [`SERVICE_NAME`].
    pub service_name: String,
    /// Service version.
    pub version: String,
}

/// Messages sent by clients.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Health probe.
    HealthCheck,
    /// Unary conversion.
    Convert(ConvertRequest),
    /// Opens (or annotates) a streaming upload.
    StreamHeader(StreamHeader),
    /// Payload bytes of a streaming upload.
    StreamData(Vec<u8>),
    /// Marks the end of the inbound frame sequence.
    StreamEnd,
}

/// Messages sent by the server.
#[derive(bincode::Encode, bincode::Decode, Clone, Debug, PartialEq)]
pub enum ServerMessage {
    /// Health reply.
    Health(HealthResponse),
    /// Unary success.
    Converted(ConvertResponse),
    /// Unary failure.
    Rejected(Rejection),
    /// Frame of a streaming exchange.
    Stream(OutboundFrame),
}
