//! Client for the conversion service.
//!
//! [`ExtractorClient`] speaks the same length-delimited bincode protocol as
//! [`ConversionServer`](crate::server::ConversionServer). Streaming uploads
//! are sent while output frames are read, so a server that fails early is
//! observed without waiting for the upload to finish.

use std::num::NonZeroUsize;

use futures::{SinkExt, StreamExt};
use tokio::net::{
    TcpStream,
    ToSocketAddrs,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    protocol::{
        ClientMessage,
        ConvertRequest,
        ConvertResponse,
        HealthResponse,
        MessageCodec,
        ServerMessage,
        StreamHeader,
    },
    session::DEFAULT_CHUNK_SIZE,
};

mod error;
mod streaming;

pub use error::ClientError;
use streaming::OutputAssembler;
pub use streaming::StreamedImage;

type Codec = MessageCodec<ServerMessage, ClientMessage>;

/// Connection to a conversion server.
#[derive(Debug)]
pub struct ExtractorClient {
    reader: FramedRead<OwnedReadHalf, Codec>,
    writer: FramedWrite<OwnedWriteHalf, Codec>,
    chunk_size: NonZeroUsize,
}

impl ExtractorClient {
    /// Connect to the server at `addr`.
    ///
    /// # Errors
    /// Returns [`ClientError::Io`] if the TCP connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: FramedRead::new(read, Codec::default()),
            writer: FramedWrite::new(write, Codec::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use `chunk_size` for streaming uploads.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Query server liveness.
    ///
    /// # Errors
    /// Fails on transport errors or an unexpected reply.
    pub async fn health(&mut self) -> Result<HealthResponse, ClientError> {
        match self.call(ClientMessage::HealthCheck).await? {
            ServerMessage::Health(report) => Ok(report),
            _ => Err(ClientError::UnexpectedReply { expected: "health" }),
        }
    }

    /// Convert `exr_data` in a single request.
    ///
    /// # Errors
    /// Returns [`ClientError::Rejected`] when the server refuses the payload.
    pub async fn convert(&mut self, exr_data: Vec<u8>) -> Result<ConvertResponse, ClientError> {
        match self
            .call(ClientMessage::Convert(ConvertRequest { exr_data }))
            .await?
        {
            ServerMessage::Converted(response) => Ok(response),
            ServerMessage::Rejected(rejection) => Err(rejection.into()),
            _ => Err(ClientError::UnexpectedReply {
                expected: "conversion",
            }),
        }
    }

    /// Upload `exr_data` in chunks and reassemble the streamed PNG.
    ///
    /// # Errors
    /// Returns [`ClientError::Failed`] when the server reports an `ERROR`
    /// status and [`ClientError::Protocol`] when its frames are misordered.
    pub async fn convert_streaming(
        &mut self,
        filename: &str,
        exr_data: &[u8],
    ) -> Result<StreamedImage, ClientError> {
        let header = StreamHeader {
            filename: filename.to_owned(),
            total_size: exr_data.len() as u64,
            chunk_size_hint: u32::try_from(self.chunk_size.get()).unwrap_or(u32::MAX),
        };
        let chunk_size = self.chunk_size.get();
        let upload = send_upload(&mut self.writer, header, exr_data, chunk_size);
        let download = receive_output(&mut self.reader);

        let (uploaded, downloaded) = tokio::join!(upload, download);
        // The server may close the socket after an early ERROR status, so the
        // download result takes precedence over upload failures.
        let image = downloaded?;
        uploaded?;
        Ok(image)
    }

    async fn call(&mut self, request: ClientMessage) -> Result<ServerMessage, ClientError> {
        self.writer.send(request).await?;
        match self.reader.next().await {
            Some(reply) => Ok(reply?),
            None => Err(ClientError::Disconnected),
        }
    }
}

async fn send_upload(
    writer: &mut FramedWrite<OwnedWriteHalf, Codec>,
    header: StreamHeader,
    exr_data: &[u8],
    chunk_size: usize,
) -> Result<(), ClientError> {
    writer.send(ClientMessage::StreamHeader(header)).await?;
    for chunk in exr_data.chunks(chunk_size) {
        writer.send(ClientMessage::StreamData(chunk.to_vec())).await?;
    }
    writer.send(ClientMessage::StreamEnd).await?;
    Ok(())
}

async fn receive_output(
    reader: &mut FramedRead<OwnedReadHalf, Codec>,
) -> Result<StreamedImage, ClientError> {
    let mut assembler = OutputAssembler::default();
    loop {
        match reader.next().await {
            Some(Ok(ServerMessage::Stream(frame))) => {
                if let Some(image) = assembler.push(frame)? {
                    return Ok(image);
                }
            }
            Some(Ok(_)) => {
                return Err(ClientError::UnexpectedReply {
                    expected: "stream frame",
                });
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::Disconnected),
        }
    }
}
