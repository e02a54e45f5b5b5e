//! Streaming conversion sessions.
//!
//! A session consumes the inbound frames of one streaming exchange,
//! reassembles the payload, runs the [`Pipeline`], and emits outbound
//! frames in phase order:
//!
//! ```text
//! AwaitingHeader → Receiving → Processing → Sending → Complete
//!        └──────────────┴────────────┴──────────┴──────→ Error
//! ```
//!
//! A receiver always observes zero or more status frames, then exactly one
//! output header, then the output data in order, then one terminal status.
//! An `ERROR` status is always the last frame of a session.

use std::{
    fmt, io,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures::{Stream, StreamExt};
use tokio::{sync::mpsc, time};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    pipeline::Pipeline,
    protocol::{InboundFrame, OutboundFrame, OutputHeader, ProcessingStatus, StatusKind},
};

pub mod reassembly;

pub use reassembly::{Progress, Reassembly, ReassemblyError};

/// Default size of outbound data frames (256 KiB).
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(256 * 1024) {
    Some(size) => size,
    None => unreachable!(),
};

/// Default idle limit while waiting for inbound frames.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a session, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:08x}", self.0) }
}

/// Phase of a session's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No frame received yet.
    AwaitingHeader,
    /// Accumulating payload bytes.
    Receiving,
    /// Running the pipeline.
    Processing,
    /// Emitting output frames.
    Sending,
    /// Finished successfully.
    Complete,
    /// Finished with a failure.
    Error,
}

impl Phase {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingHeader, Self::Receiving | Self::Processing)
                | (Self::Receiving, Self::Processing)
                | (Self::Processing, Self::Sending)
                | (Self::Sending, Self::Complete)
                | (Self::AwaitingHeader | Self::Receiving | Self::Processing | Self::Sending, Self::Error)
        )
    }

    /// Whether the session has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Complete | Self::Error) }
}

/// Per-session tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Maximum payload size of each outbound data frame.
    pub chunk_size: NonZeroUsize,
    /// Limit on the wait for each inbound frame.
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Output was delivered in full.
    Completed {
        /// Output width.
        width: u32,
        /// Output height.
        height: u32,
        /// Encoded output length.
        bytes: usize,
    },
    /// A terminal `ERROR` status was emitted (best effort).
    Failed(String),
    /// The peer went away; nothing further was sent.
    Cancelled,
}

/// The outbound receiver was dropped.
struct Disconnected;

struct Session<'a> {
    id: SessionId,
    phase: Phase,
    outbound: &'a mpsc::Sender<OutboundFrame>,
}

impl Session<'_> {
    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        debug!(session = %self.id, from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }

    async fn emit(&self, frame: OutboundFrame) -> Result<(), Disconnected> {
        self.outbound.send(frame).await.map_err(|_| Disconnected)?;
        crate::metrics::inc_frames(crate::metrics::Direction::Outbound);
        Ok(())
    }

    async fn status(
        &self,
        phase: StatusKind,
        message: impl Into<String>,
        progress: f32,
    ) -> Result<(), Disconnected> {
        self.emit(OutboundFrame::Status(ProcessingStatus::new(
            phase, message, progress,
        )))
        .await
    }

    async fn fail(&mut self, message: String) -> SessionOutcome {
        warn!(session = %self.id, phase = ?self.phase, %message, "session failed");
        self.advance(Phase::Error);
        match self.status(StatusKind::Error, message.clone(), 0.0).await {
            Ok(()) => SessionOutcome::Failed(message),
            Err(Disconnected) => SessionOutcome::Cancelled,
        }
    }
}

/// Drive one streaming exchange to completion.
///
/// `inbound` yields the client's frames: `None` marks the end of the
/// sequence and an `Err` means the peer went away. Outbound frames are sent
/// on `outbound` strictly in phase order; if the receiver is dropped the
/// session stops and reports [`SessionOutcome::Cancelled`].
pub async fn run_session<S>(
    id: SessionId,
    mut inbound: S,
    outbound: &mpsc::Sender<OutboundFrame>,
    pipeline: &Pipeline,
    options: &SessionOptions,
) -> SessionOutcome
where
    S: Stream<Item = io::Result<InboundFrame>> + Unpin,
{
    let mut session = Session {
        id,
        phase: Phase::AwaitingHeader,
        outbound,
    };
    let mut reassembly = Reassembly::new();

    loop {
        let frame = match time::timeout(options.idle_timeout, inbound.next()).await {
            Err(_) => return session.fail("idle timeout".to_owned()).await,
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                info!(session = %id, phase = ?session.phase, error = %e, "session cancelled by peer");
                return SessionOutcome::Cancelled;
            }
            Ok(Some(Ok(frame))) => frame,
        };
        crate::metrics::inc_frames(crate::metrics::Direction::Inbound);

        let step = match frame {
            InboundFrame::Header(header) => {
                info!(
                    session = %id,
                    filename = %header.filename,
                    total_size = header.total_size,
                    "receiving upload"
                );
                let label = format!("Receiving {}", header.filename);
                if let Err(e) = reassembly.accept_header(header) {
                    return session.fail(e.to_string()).await;
                }
                if session.phase == Phase::AwaitingHeader {
                    session.advance(Phase::Receiving);
                }
                session.status(StatusKind::Receiving, label, 0.0).await
            }
            InboundFrame::Data(bytes) => match reassembly.push(&bytes) {
                Err(e) => return session.fail(e.to_string()).await,
                Ok(progress) => {
                    if session.phase == Phase::AwaitingHeader {
                        session.advance(Phase::Receiving);
                    }
                    match progress {
                        Some(p) => {
                            let message = format!("Received {}/{} bytes", p.received, p.declared);
                            session
                                .status(StatusKind::Receiving, message, p.fraction)
                                .await
                        }
                        None => Ok(()),
                    }
                }
            },
        };
        if step.is_err() {
            return SessionOutcome::Cancelled;
        }
    }

    info!(session = %id, received = reassembly.len(), "upload finished");
    if reassembly.is_empty() {
        return session.fail("No data received".to_owned()).await;
    }
    if let Some(declared) = reassembly.declared_size()
        && (reassembly.len() as u64) < declared
    {
        warn!(
            session = %id,
            received = reassembly.len(),
            declared,
            "upload shorter than declared"
        );
    }

    session.advance(Phase::Processing);
    if session
        .status(StatusKind::Processing, "Processing EXR to PNG", 0.0)
        .await
        .is_err()
    {
        return SessionOutcome::Cancelled;
    }
    let converted = match pipeline
        .process(&reassembly.into_bytes())
        .instrument(info_span!("convert", session = %id))
        .await
    {
        Ok(converted) => converted,
        Err(e) => return session.fail(e.user_message()).await,
    };

    session.advance(Phase::Sending);
    let total = converted.png.len();
    let sent = send_output(&session, &converted.png, converted.width, converted.height, options).await;
    if sent.is_err() {
        info!(session = %id, "peer went away while sending");
        return SessionOutcome::Cancelled;
    }

    session.advance(Phase::Complete);
    let summary = format!(
        "Completed: {}x{} PNG ({total} bytes)",
        converted.width, converted.height
    );
    if session.status(StatusKind::Complete, summary, 1.0).await.is_err() {
        return SessionOutcome::Cancelled;
    }
    info!(session = %id, bytes = total, "session complete");
    SessionOutcome::Completed {
        width: converted.width,
        height: converted.height,
        bytes: total,
    }
}

async fn send_output(
    session: &Session<'_>,
    png: &[u8],
    width: u32,
    height: u32,
    options: &SessionOptions,
) -> Result<(), Disconnected> {
    session
        .status(StatusKind::Sending, "Sending PNG data", 0.0)
        .await?;
    session
        .emit(OutboundFrame::Header(OutputHeader {
            width,
            height,
            total_size: png.len() as u64,
        }))
        .await?;
    for chunk in png.chunks(options.chunk_size.get()) {
        session.emit(OutboundFrame::Data(chunk.to_vec())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
