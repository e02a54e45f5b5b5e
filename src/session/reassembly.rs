//! Inbound payload accumulation for one streaming exchange.
//!
//! [`Reassembly`] owns the append-only buffer of a single session. It
//! enforces header ordering, rejects payloads that outgrow their declared
//! size, and reports progress each time the buffer crosses another tenth of
//! the declared size.

use thiserror::Error;

use crate::protocol::StreamHeader;

/// Progress fractions reported while receiving stay strictly below this.
pub const MAX_RECEIVING_PROGRESS: f32 = 0.99;

/// Number of progress milestones across the declared size.
const MILESTONES: u64 = 10;

/// Violations of the inbound frame ordering contract.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// A second header arrived.
    #[error("duplicate stream header")]
    DuplicateHeader,
    /// A header arrived after payload bytes.
    #[error("stream header received after {received} data bytes")]
    HeaderAfterData {
        /// Bytes accumulated before the header.
        received: usize,
    },
    /// More bytes arrived than the header declared.
    #[error("received {received} bytes, more than the declared {declared}")]
    Overflow {
        /// Declared payload size.
        declared: u64,
        /// Bytes that would have been held after the offending frame.
        received: u64,
    },
}

/// Progress snapshot emitted on a milestone crossing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Bytes accumulated so far.
    pub received: u64,
    /// Declared payload size.
    pub declared: u64,
    /// `received / declared`, capped at [`MAX_RECEIVING_PROGRESS`].
    pub fraction: f32,
}

/// Append-only accumulator for one session's payload.
#[derive(Debug, Default)]
pub struct Reassembly {
    header: Option<StreamHeader>,
    buffer: Vec<u8>,
    next_milestone: u64,
    /// Set by any data frame, including empty ones.
    saw_data: bool,
}

impl Reassembly {
    /// Empty accumulator with no header.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record the stream header.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::DuplicateHeader`] if a header was already
    /// recorded and [`ReassemblyError::HeaderAfterData`] if any data frame,
    /// even an empty one, came first.
    pub fn accept_header(&mut self, header: StreamHeader) -> Result<(), ReassemblyError> {
        if self.header.is_some() {
            return Err(ReassemblyError::DuplicateHeader);
        }
        if self.saw_data {
            return Err(ReassemblyError::HeaderAfterData {
                received: self.buffer.len(),
            });
        }
        if let Ok(capacity) = usize::try_from(header.total_size) {
            // Preallocate modestly; the declared size is untrusted.
            self.buffer.reserve(capacity.min(64 * 1024 * 1024));
        }
        self.header = Some(header);
        self.next_milestone = 1;
        Ok(())
    }

    /// Append a data frame, returning progress if a milestone was crossed.
    ///
    /// A frame crossing several milestones yields a single report.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::Overflow`] if the frame would take the
    /// buffer past a non-zero declared size. The frame is not appended.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Progress>, ReassemblyError> {
        self.saw_data = true;
        let received = self.buffer.len() as u64 + data.len() as u64;
        let Some(declared) = self.declared_size() else {
            self.buffer.extend_from_slice(data);
            return Ok(None);
        };
        if received > declared {
            return Err(ReassemblyError::Overflow { declared, received });
        }
        self.buffer.extend_from_slice(data);

        let reached = received.saturating_mul(MILESTONES) / declared;
        if reached < self.next_milestone {
            return Ok(None);
        }
        self.next_milestone = reached + 1;
        Ok(Some(Progress {
            received,
            declared,
            fraction: fraction(received, declared),
        }))
    }

    /// Declared payload size, `None` when absent or zero.
    #[must_use]
    pub fn declared_size(&self) -> Option<u64> {
        self.header
            .as_ref()
            .map(|h| h.total_size)
            .filter(|&size| size > 0)
    }

    /// Advisory filename from the header.
    #[must_use]
    pub fn filename(&self) -> Option<&str> { self.header.as_ref().map(|h| h.filename.as_str()) }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize { self.buffer.len() }

    /// Whether no bytes have been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    /// Consume the accumulator, yielding the payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> { self.buffer }
}

#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "progress is advisory; f64 precision then f32 is ample"
)]
fn fraction(received: u64, declared: u64) -> f32 {
    ((received as f64 / declared as f64) as f32).min(MAX_RECEIVING_PROGRESS)
}
