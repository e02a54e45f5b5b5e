//! Runtime control for [`ConversionServer`].

mod accept;
mod backoff;

use std::sync::Arc;

pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::warn;
use tokio::{select, signal, sync::Semaphore};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use super::{Bound, ConversionServer, ServerError, SharedService};

impl ConversionServer<Bound> {
    /// Run the server until a shutdown signal is received.
    ///
    /// Spawns the configured number of accept loops and awaits Ctrl+C for
    /// shutdown.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use exrframe::{decode::SubprocessDecoder, pipeline::Pipeline, server::ConversionServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let pipeline = Pipeline::new(SubprocessDecoder::current_exe()?);
    /// let server = ConversionServer::new(pipeline).bind(([127, 0, 0, 1], 50051).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use exrframe::{decode::SubprocessDecoder, pipeline::Pipeline, server::ConversionServer};
    ///
    /// async fn try_run() {
    ///     ConversionServer::new(Pipeline::new(SubprocessDecoder::new("true")))
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// In-flight connections are allowed to finish before this returns.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let ConversionServer {
            pipeline,
            session_options,
            max_message_size,
            max_sessions,
            workers,
            ready_tx,
            backoff_config,
            state: Bound { listener },
        } = self;
        let service = Arc::new(SharedService {
            pipeline,
            session_options,
            max_message_size,
            permits: Semaphore::new(max_sessions),
        });
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                Arc::clone(&service),
                AcceptLoopOptions {
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: backoff_config,
                },
            ));
        }
        info!(
            addr = ?listener.local_addr().ok(),
            workers,
            max_sessions,
            "server listening"
        );

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }
}
