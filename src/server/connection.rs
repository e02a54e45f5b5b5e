//! Connection handling for [`ConversionServer`](super::ConversionServer).

use std::{io, net::SocketAddr, sync::Arc};

use futures::{FutureExt, SinkExt, Stream, StreamExt, stream};
use log::{error, warn};
use tokio::{
    io::AsyncRead,
    net::{TcpStream, tcp::OwnedWriteHalf},
    select,
    sync::mpsc,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
    task::TaskTracker,
};
use tracing::{debug, info};

use super::SharedService;
use crate::{
    protocol::{ClientMessage, InboundFrame, MessageCodec, OutboundFrame, ServerMessage},
    session::{SessionId, SessionOutcome, run_session},
    unary,
};

/// Outbound frames buffered between a session and the socket writer.
const OUTBOUND_BUFFER: usize = 8;

type Codec = MessageCodec<ClientMessage, ServerMessage>;
type Writer = FramedWrite<OwnedWriteHalf, Codec>;

/// Spawn a task to process a single TCP connection, logging and discarding any panics.
///
/// The connection stops reading new calls once `shutdown` is cancelled; a
/// call already in progress runs to completion.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    service: Arc<SharedService>,
    tracker: &TaskTracker,
    shutdown: CancellationToken,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        crate::metrics::inc_connections();
        let fut = std::panic::AssertUnwindSafe(serve_connection(stream, peer_addr, service, shutdown))
            .catch_unwind();

        match fut.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(?peer_addr, error = %e, "connection closed with error");
            }
            Err(panic) => {
                crate::metrics::inc_failures("connection_panic");
                let panic_msg = crate::panic::format_panic(panic.as_ref());
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
                tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
            }
        }
        crate::metrics::dec_connections();
    });
}

/// Serve calls on one connection until the peer closes it.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve_connection(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    service: Arc<SharedService>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let (read, write) = stream.into_split();
    let mut reader = FramedRead::new(read, Codec::new(service.max_message_size));
    let mut writer = FramedWrite::new(write, Codec::new(service.max_message_size));

    loop {
        let message = select! {
            biased;

            () = shutdown.cancelled() => {
                debug!(?peer_addr, "closing idle connection on shutdown");
                return Ok(());
            }
            message = reader.next() => message,
        };
        let Some(message) = message else {
            return Ok(());
        };
        let first = match message? {
            ClientMessage::HealthCheck => {
                writer.send(ServerMessage::Health(unary::health())).await?;
                continue;
            }
            ClientMessage::Convert(request) => {
                let reply = {
                    let _permit = acquire(&service).await?;
                    match unary::convert(&service.pipeline, request).await {
                        Ok(response) => ServerMessage::Converted(response),
                        Err(rejection) => ServerMessage::Rejected(rejection),
                    }
                };
                writer.send(reply).await?;
                continue;
            }
            ClientMessage::StreamHeader(header) => Some(InboundFrame::Header(header)),
            ClientMessage::StreamData(bytes) => Some(InboundFrame::Data(bytes)),
            ClientMessage::StreamEnd => None,
        };

        let outcome = serve_exchange(&service, &mut reader, &mut writer, first).await;
        match outcome {
            SessionOutcome::Completed { .. } => {}
            SessionOutcome::Failed(_) | SessionOutcome::Cancelled => {
                info!(?peer_addr, ?outcome, "closing connection after streaming exchange");
                return Ok(());
            }
        }
    }
}

async fn acquire(service: &SharedService) -> io::Result<tokio::sync::SemaphorePermit<'_>> {
    service
        .permits
        .acquire()
        .await
        .map_err(|_| io::Error::other("session limiter closed"))
}

/// Run one streaming exchange whose first inbound frame was `first`.
///
/// The session and the socket writer run concurrently; the writer drains the
/// session's outbound channel so frames reach the peer in emission order.
async fn serve_exchange<R>(
    service: &SharedService,
    reader: &mut FramedRead<R, Codec>,
    writer: &mut Writer,
    first: Option<InboundFrame>,
) -> SessionOutcome
where
    R: AsyncRead + Unpin,
{
    let id = SessionId::next();
    let (tx, rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);
    let inbound = exchange_frames(reader, first);
    let pipeline = &service.pipeline;
    let options = &service.session_options;

    let session = async move {
        let Ok(_permit) = acquire(service).await else {
            return SessionOutcome::Cancelled;
        };
        crate::metrics::inc_sessions();
        let outcome = run_session(id, inbound, &tx, pipeline, options).await;
        crate::metrics::dec_sessions();
        outcome
    };
    let forward = async move {
        let mut rx = rx;
        while let Some(frame) = rx.recv().await {
            writer.send(ServerMessage::Stream(frame)).await?;
        }
        Ok::<(), io::Error>(())
    };

    let (outcome, forwarded) = tokio::join!(session, forward);
    match forwarded {
        Ok(()) => outcome,
        Err(e) => {
            debug!(session = %id, error = %e, "failed to deliver session output");
            SessionOutcome::Cancelled
        }
    }
}

/// Inbound frames of the current exchange, ending at `StreamEnd`.
///
/// End of input before `StreamEnd` and calls other than streaming frames
/// are reported as errors, which cancel the session.
fn exchange_frames<'a, R>(
    reader: &'a mut FramedRead<R, Codec>,
    first: Option<InboundFrame>,
) -> impl Stream<Item = io::Result<InboundFrame>> + Unpin + 'a
where
    R: AsyncRead + Unpin + 'a,
{
    let ended = first.is_none();
    let state = (!ended).then_some((reader, first));
    Box::pin(stream::unfold(state, |state| async move {
        let (reader, pending) = state?;
        if let Some(frame) = pending {
            return Some((Ok(frame), Some((reader, None))));
        }
        let item = match reader.next().await {
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection before StreamEnd",
            )),
            Some(Err(e)) => Err(e),
            Some(Ok(ClientMessage::StreamHeader(header))) => Ok(InboundFrame::Header(header)),
            Some(Ok(ClientMessage::StreamData(bytes))) => Ok(InboundFrame::Data(bytes)),
            Some(Ok(ClientMessage::StreamEnd)) => return None,
            Some(Ok(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unary call received during a streaming exchange",
            )),
        };
        let next = item.is_ok().then_some((reader, None));
        Some((item, next))
    }))
}
