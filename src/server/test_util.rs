//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use rstest::fixture;
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_util::codec::Framed;

use super::{Bound, ConversionServer};
use crate::{
    pipeline::Pipeline,
    protocol::{ClientMessage, MessageCodec, ServerMessage},
    test_support::GreyDecoder,
};

/// Framed client side of a test connection.
pub type TestConnection = Framed<TcpStream, MessageCodec<ServerMessage, ClientMessage>>;

#[fixture]
pub fn pipeline() -> Pipeline {
    Pipeline::new(GreyDecoder {
        width: 8,
        height: 6,
    })
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

pub fn bind_server(pipeline: Pipeline, listener: StdTcpListener) -> ConversionServer<Bound> {
    ConversionServer::new(pipeline)
        .workers(1)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

/// Server running on a background task until [`Running::shutdown`].
pub struct Running {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Running {
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stopped in time")
            .expect("server task");
    }
}

pub fn start(pipeline: Pipeline, listener: StdTcpListener) -> Running {
    let server = bind_server(pipeline, listener);
    let addr = server.local_addr().expect("bound address");
    let (stop, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .run_with_shutdown(async {
                let _ = rx.await;
            })
            .await
            .expect("server run failed");
    });
    Running { addr, stop, handle }
}

pub async fn connect(addr: SocketAddr) -> TestConnection {
    let stream = TcpStream::connect(addr).await.expect("connect");
    Framed::new(stream, MessageCodec::default())
}

/// Send `request` and wait for the next reply.
pub async fn call(conn: &mut TestConnection, request: ClientMessage) -> ServerMessage {
    conn.send(request).await.expect("send request");
    conn.next()
        .await
        .expect("connection closed before reply")
        .expect("decode reply")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_listener_uses_localhost() {
        let listener = free_listener();
        let addr = listener.local_addr().expect("failed to get address");
        assert_eq!(addr.ip(), std::net::IpAddr::from(Ipv4Addr::LOCALHOST));
    }
}
