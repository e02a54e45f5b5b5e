//! Tokio-based server for the conversion service.
//!
//! `ConversionServer` spawns worker tasks that accept TCP connections and
//! serve the calls described in [`crate::protocol`] on each of them. All
//! connections share one read-only [`Pipeline`] and a bound on the number
//! of conversions running at once.

use std::sync::Arc;

use tokio::{
    net::TcpListener,
    sync::{Semaphore, oneshot},
};

use crate::{pipeline::Pipeline, session::SessionOptions};

/// Tokio-based server for conversion requests.
///
/// The server carries a typestate `S` indicating whether it is
/// [`Unbound`] (not yet bound to a TCP listener) or [`Bound`]. New
/// servers start `Unbound` and must call [`ConversionServer::bind`] or
/// [`ConversionServer::bind_existing_listener`] before running. The server
/// listens for a shutdown signal using `tokio::signal::ctrl_c` and notifies
/// all workers to stop accepting new connections.
pub struct ConversionServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) pipeline: Pipeline,
    pub(crate) session_options: SessionOptions,
    pub(crate) max_message_size: usize,
    pub(crate) max_sessions: usize,
    pub(crate) workers: usize,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so
    /// a new one must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

/// Read-only state shared by every connection of a running server.
#[derive(Debug)]
pub(crate) struct SharedService {
    pub(crate) pipeline: Pipeline,
    pub(crate) session_options: SessionOptions,
    pub(crate) max_message_size: usize,
    /// Bounds the number of conversions in flight.
    pub(crate) permits: Semaphore,
}

mod config;
pub use config::{DEFAULT_MAX_SESSIONS, binding};
mod connection;
pub mod error;
mod runtime;

pub use error::ServerError;
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
