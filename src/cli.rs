//! Command line interface for the `exrframe` binary.
//!
//! Also compiled by `build.rs` to render the manual page, so this file must
//! not depend on the library crate.

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `exrframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "exrframe",
    version,
    about = "Tone-map OpenEXR images to PNG, streamed over TCP"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the conversion service.
    Serve(ServeArgs),
    /// Convert one EXR file from the data directory.
    Convert(ConvertArgs),
    /// Decode an EXR file and write its planes to stdout.
    #[command(name = "decode-worker", hide = true)]
    DecodeWorker {
        /// File to decode.
        path: PathBuf,
    },
}

/// Tone-mapping options shared by `serve` and `convert`.
#[derive(Debug, Args)]
pub struct ToneArgs {
    /// Exposure adjustment in stops.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub exposure: f32,
    /// Reinhard key value.
    #[arg(long, default_value_t = 0.18)]
    pub key: f32,
    /// Write linear values instead of applying the sRGB transfer curve.
    #[arg(long)]
    pub linear: bool,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 50051)]
    pub port: u16,
    /// Root for path-based operations.
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    pub data_dir: PathBuf,
    /// Maximum number of conversions running at once.
    #[arg(long, default_value_t = 10)]
    pub max_sessions: usize,
    /// Largest accepted message in bytes; unlimited when omitted.
    #[arg(long)]
    pub max_message_size: Option<usize>,
    /// Payload size of each outbound PNG data frame in bytes.
    #[arg(long, default_value = "262144")]
    pub chunk_size: NonZeroUsize,
    /// Seconds to wait for the next inbound frame of an upload.
    #[arg(long, default_value_t = 60)]
    pub idle_timeout_secs: u64,
    /// Seconds allowed for one isolated decode.
    #[arg(long, default_value_t = 10)]
    pub decode_timeout_secs: u64,
    /// Number of accept loops; defaults to the available parallelism.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
    #[command(flatten)]
    pub tone: ToneArgs,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// EXR file, relative to the data directory.
    pub input: String,
    /// Output PNG; defaults to the input path with a `.png` extension.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Root the input path is resolved against.
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    pub data_dir: PathBuf,
    /// Seconds allowed for the isolated decode.
    #[arg(long, default_value_t = 10)]
    pub decode_timeout_secs: u64,
    #[command(flatten)]
    pub tone: ToneArgs,
}
