//! Process-wide service configuration.
//!
//! [`ServiceConfig`] is assembled once at start-up (from the command line in
//! the bundled binary) and stays read-only while the server runs.
//! [`DataDir`] resolves caller-supplied relative paths beneath the data
//! directory root.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use crate::{
    decode::SubprocessDecoder,
    protocol::UNLIMITED_MESSAGE_SIZE,
    server::DEFAULT_MAX_SESSIONS,
    session::{DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT, SessionOptions},
    tonemap::ToneMapParams,
};

/// Port the service listens on by default.
pub const DEFAULT_PORT: u16 = 50051;
/// Data directory root used when none is configured.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Settings shared by every connection of a running service.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    /// Address to bind.
    pub host: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// Root for path-based operations.
    pub data_dir: PathBuf,
    /// Maximum number of conversions running at once.
    pub max_sessions: usize,
    /// Largest accepted protocol message in bytes.
    pub max_message_size: usize,
    /// Payload size of each outbound data frame.
    pub chunk_size: NonZeroUsize,
    /// Limit on the wait for each inbound streaming frame.
    pub idle_timeout: Duration,
    /// Wall-clock limit for one isolated decode.
    pub decode_timeout: Duration,
    /// Tone-mapping parameters applied to every conversion.
    pub tone_map: ToneMapParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_message_size: UNLIMITED_MESSAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            decode_timeout: SubprocessDecoder::DEFAULT_TIMEOUT,
            tone_map: ToneMapParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Socket address formed from `host` and `port`.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }

    /// Per-session streaming options.
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            chunk_size: self.chunk_size,
            idle_timeout: self.idle_timeout,
        }
    }

    /// Resolver for paths beneath `data_dir`.
    #[must_use]
    pub fn data_root(&self) -> DataDir { DataDir::new(&self.data_dir) }
}

/// Reasons a caller-supplied path cannot be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),
    #[error("parent directory components are not allowed: {0}")]
    ParentTraversal(String),
    #[error("path escapes the data directory: {0}")]
    Escapes(String),
}

/// Data directory root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    #[must_use]
    pub fn root(&self) -> &Path { &self.root }

    /// Resolve `relative` beneath the root.
    ///
    /// Only plain relative paths are accepted. When the resolved path exists
    /// it is canonicalised and must still lie inside the canonical root, so
    /// symbolic links cannot lead outside the data directory.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] naming the offending path.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        if relative.is_empty() {
            return Err(PathError::Empty);
        }
        let candidate = Path::new(relative);
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(PathError::ParentTraversal(relative.to_owned()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(relative.to_owned()));
                }
            }
        }

        let joined = self.root.join(candidate);
        if let (Ok(root), Ok(resolved)) = (self.root.canonicalize(), joined.canonicalize()) {
            if !resolved.starts_with(&root) {
                return Err(PathError::Escapes(relative.to_owned()));
            }
            return Ok(resolved);
        }
        Ok(joined)
    }
}
