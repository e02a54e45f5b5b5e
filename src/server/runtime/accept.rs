//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::server::{SharedService, connection::spawn_connection_task};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accepts incoming connections and spawns handler tasks.
///
/// Each accepted connection is served on its own task against the shared
/// `service`. Failures to accept trigger an exponential back-off. The loop
/// terminates when `shutdown` is cancelled; spawned tasks are tracked by
/// `tracker` for graceful shutdown.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    service: Arc<SharedService>,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + Send + Sync + 'static,
{
    let AcceptLoopOptions {
        shutdown,
        tracker,
        backoff,
    } = options;
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(next_delay) =
        accept_iteration(&listener, &service, &shutdown, &tracker, &backoff, delay).await
    {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &Arc<L>,
    service: &Arc<SharedService>,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + Send + Sync + 'static,
{
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, _)) => {
                spawn_connection_task(stream, Arc::clone(service), tracker, shutdown.clone());
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                backoff.next_delay(delay)
            }
        }),
    }
}
