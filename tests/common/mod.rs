//! Shared utilities for integration tests.
//!
//! Provides a server runner bound to an unused local port, a decoder that
//! runs the real `decode-worker` subprocess, and EXR payload builders.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    io::Cursor,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use exr::prelude::{Image, SpecificChannels, Vec2, WritableImage};
use exrframe::{
    decode::{SubprocessDecoder, worker::WORKER_SUBCOMMAND},
    pipeline::Pipeline,
    server::ConversionServer,
};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

/// Create a TCP listener bound to a free local port.
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Decoder running this package's binary in worker mode.
pub fn worker_decoder() -> SubprocessDecoder {
    SubprocessDecoder::new(env!("CARGO_BIN_EXE_exrframe"))
        .arg(WORKER_SUBCOMMAND)
        .timeout(Duration::from_secs(30))
}

/// Server running on a background task.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn start(pipeline: Pipeline) -> Self {
        let server = ConversionServer::new(pipeline)
            .workers(2)
            .bind_existing_listener(unused_listener())
            .expect("bind server");
        let addr = server.local_addr().expect("bound address");
        let (stop, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            server
                .run_with_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .expect("server run");
        });
        Self { addr, stop, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server stopped in time")
            .expect("server task");
    }
}

/// Encode an RGB EXR whose every pixel is `value`.
pub fn uniform_exr(width: usize, height: usize, value: f32) -> Vec<u8> {
    rgb_exr(width, height, move |_| (value, value, value))
}

/// Encode an RGB EXR from a per-pixel function.
pub fn rgb_exr(
    width: usize,
    height: usize,
    pixel: impl Fn(Vec2<usize>) -> (f32, f32, f32) + Sync,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    Image::from_channels((width, height), SpecificChannels::rgb(pixel))
        .write()
        .to_buffered(Cursor::new(&mut bytes))
        .expect("encode exr");
    bytes
}

/// Payload with the EXR magic and version, padded with attribute-like text.
///
/// Passes structural validation but holds no decodable image.
pub fn plausible_exr(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x76, 0x2f, 0x31, 0x01, 0x02, 0x00, 0x00, 0x00];
    bytes.extend(
        b"channels\0chlist\0compression\0"
            .iter()
            .cycle()
            .take(len.saturating_sub(8)),
    );
    bytes
}

/// Decode `png` and return its first pixel.
pub fn first_pixel(png: &[u8]) -> [u8; 3] {
    let image = image::load_from_memory(png).expect("valid png").to_rgb8();
    image.get_pixel(0, 0).0
}
