//! Client-side reassembly of a streaming exchange's output.

use super::ClientError;
use crate::protocol::{OutboundFrame, OutputHeader, ProcessingStatus, StatusKind};

/// PNG reassembled from a streaming exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamedImage {
    /// Encoded PNG bytes.
    pub png: Vec<u8>,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Every status frame, in arrival order.
    pub statuses: Vec<ProcessingStatus>,
}

/// Checks frame ordering and collects output bytes.
///
/// Accepts status frames, then one header, then data covering exactly the
/// header's `total_size`, then a terminal status.
#[derive(Debug, Default)]
pub(super) struct OutputAssembler {
    header: Option<OutputHeader>,
    png: Vec<u8>,
    statuses: Vec<ProcessingStatus>,
}

impl OutputAssembler {
    /// Feed one frame; returns the image once the exchange completes.
    pub(super) fn push(&mut self, frame: OutboundFrame) -> Result<Option<StreamedImage>, ClientError> {
        match frame {
            OutboundFrame::Status(status) => self.status(status),
            OutboundFrame::Header(header) => {
                if self.header.is_some() {
                    return Err(violation("second output header"));
                }
                if let Ok(size) = usize::try_from(header.total_size) {
                    self.png.reserve(size);
                }
                self.header = Some(header);
                Ok(None)
            }
            OutboundFrame::Data(bytes) => {
                let Some(header) = self.header else {
                    return Err(violation("output data before header"));
                };
                if (self.png.len() + bytes.len()) as u64 > header.total_size {
                    return Err(violation("output data exceeds declared size"));
                }
                self.png.extend_from_slice(&bytes);
                Ok(None)
            }
        }
    }

    fn status(&mut self, status: ProcessingStatus) -> Result<Option<StreamedImage>, ClientError> {
        match status.phase {
            StatusKind::Error => Err(ClientError::Failed(status.message)),
            StatusKind::Complete => {
                let Some(header) = self.header else {
                    return Err(violation("completion without output header"));
                };
                if self.png.len() as u64 != header.total_size {
                    return Err(violation("completion before all output data"));
                }
                self.statuses.push(status);
                Ok(Some(StreamedImage {
                    png: std::mem::take(&mut self.png),
                    width: header.width,
                    height: header.height,
                    statuses: std::mem::take(&mut self.statuses),
                }))
            }
            _ if self.header.is_some() => Err(violation("status frame after output header")),
            _ => {
                self.statuses.push(status);
                Ok(None)
            }
        }
    }
}

fn violation(what: &str) -> ClientError { ClientError::Protocol(what.to_owned()) }
