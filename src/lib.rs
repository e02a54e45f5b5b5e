#![doc(html_root_url = "https://docs.rs/exrframe/latest")]
//! Public API for the `exrframe` library.
//!
//! This crate converts OpenEXR images into tone-mapped 8-bit PNGs and serves
//! the conversion over a length-delimited bincode protocol. Uploads may be
//! sent as a single message or as a stream of frames; untrusted EXR payloads
//! are decoded in an isolated child process.
//!
//! The conversion path is [`validate`] → [`decode`] → [`assemble`] →
//! [`tonemap`] → [`encode`], tied together by [`pipeline::Pipeline`].
//! [`server::ConversionServer`] exposes it over TCP and
//! [`client::ExtractorClient`] speaks the same protocol.

pub mod assemble;
pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tonemap;
pub mod unary;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use client::{ClientError, ExtractorClient, StreamedImage};
pub use config::{DataDir, PathError, ServiceConfig};
pub use decode::{PlaneDecoder, SubprocessDecoder};
pub use error::{ErrorCategory, ProcessError};
pub use metrics::{Direction, FAILURES_TOTAL, FRAMES_TOTAL, SESSIONS_ACTIVE};
pub use pipeline::{Converted, Pipeline};
pub use server::{ConversionServer, ServerError};
pub use tonemap::ToneMapParams;
