//! Configuration utilities for [`ConversionServer`].

use std::num::NonZeroUsize;

use tokio::sync::oneshot;

use super::{ConversionServer, ServerState, Unbound};
use crate::{
    config::ServiceConfig,
    pipeline::Pipeline,
    protocol::UNLIMITED_MESSAGE_SIZE,
    server::BackoffConfig,
    session::SessionOptions,
};

pub mod binding;


/// Conversions allowed in flight when none is configured.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

impl ConversionServer<Unbound> {
    /// Create a new `ConversionServer` running `pipeline`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). The TCP listener is unset; call
    /// [`bind`](Self::bind) before running the server.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            pipeline,
            session_options: SessionOptions::default(),
            max_message_size: UNLIMITED_MESSAGE_SIZE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            workers,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            state: Unbound,
        }
    }

    /// Create a server from a process-wide [`ServiceConfig`].
    #[must_use]
    pub fn from_config(pipeline: Pipeline, config: &ServiceConfig) -> Self {
        Self::new(pipeline)
            .session_options(config.session_options())
            .max_message_size(config.max_message_size)
            .max_sessions(config.max_sessions)
    }
}

impl<S> ConversionServer<S>
where
    S: ServerState,
{
    /// Set the number of accept loops to spawn.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Bound the number of conversions running at once.
    #[must_use]
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.max_sessions = count.max(1);
        self
    }

    /// Set the largest inbound or outbound frame accepted on a connection.
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Set per-session chunking and idle limits.
    #[must_use]
    pub fn session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configure the accept-loop back-off.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Returns the configured number of accept loops.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Returns the configured conversion concurrency bound.
    #[inline]
    #[must_use]
    pub const fn session_limit(&self) -> usize { self.max_sessions }

    /// Returns the configured accept-loop back-off.
    #[inline]
    #[must_use]
    pub const fn backoff(&self) -> BackoffConfig { self.backoff_config }
}
