//! Parent side of the decoder isolation boundary.

use std::{
    env,
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use log::warn;
use tempfile::NamedTempFile;
use tokio::{process::Command, time};

use super::{DecodeFailure, DecodedPlanes, PlaneDecoder, worker};
use crate::message::Message;

/// Upper bound on captured diagnostic text carried into error messages.
const MAX_DIAGNOSTIC_LEN: usize = 2048;

/// Runs the EXR decoder in a child process with a wall-clock limit.
///
/// Each call stages the payload in a private temporary file, starts
/// `program args... <path>`, and waits for the child to write a bincode
/// [`DecodedPlanes`] to stdout. The child is killed if the limit elapses or
/// the calling future is dropped, and the temporary file is removed on every
/// exit path.
///
/// Exit status contract with the child:
///
/// - `0`: stdout holds the decoded planes;
/// - [`worker::REJECTED_EXIT_CODE`]: the file was rejected, stderr says why;
/// - anything else, including death by signal: the decoder crashed.
#[derive(Clone, Debug)]
pub struct SubprocessDecoder {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl SubprocessDecoder {
    /// Wall-clock limit applied when none is configured.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Decoder running `program` with no extra arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Decoder that re-executes the running binary's `decode-worker`
    /// subcommand.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the current executable cannot be located.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(env::current_exe()?).arg(worker::WORKER_SUBCOMMAND))
    }

    /// Append an argument passed before the staged file path.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the wall-clock limit for one decode.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wall-clock limit for one decode.
    #[must_use]
    pub const fn decode_timeout(&self) -> Duration { self.timeout }

    async fn run_child(&self, path: &Path) -> Result<DecodedPlanes, DecodeFailure> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecodeFailure::Spawn)?;

        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(DecodeFailure::Spawn)?,
            Err(_) => {
                return Err(DecodeFailure::TimedOut {
                    after: self.timeout,
                });
            }
        };

        let diagnostics = tail_lossy(&output.stderr, MAX_DIAGNOSTIC_LEN);
        if output.status.success() {
            let (planes, _) =
                DecodedPlanes::from_bytes(&output.stdout).map_err(DecodeFailure::MalformedOutput)?;
            return Ok(planes);
        }
        if output.status.code() == Some(i32::from(worker::REJECTED_EXIT_CODE)) {
            let reason = if diagnostics.is_empty() {
                "unknown error".to_owned()
            } else {
                diagnostics
            };
            return Err(DecodeFailure::Rejected { reason });
        }
        Err(DecodeFailure::Crashed {
            status: output.status,
            diagnostics,
        })
    }
}

#[async_trait]
impl PlaneDecoder for SubprocessDecoder {
    async fn decode(&self, bytes: &[u8]) -> Result<DecodedPlanes, DecodeFailure> {
        let staged = stage_payload(bytes).await?;
        let outcome = self.run_child(staged.path()).await;
        if let Err(e) = staged.close() {
            warn!("failed to remove staged decoder input: error={e}");
        }
        outcome
    }
}

/// Write `bytes` to a fresh private temporary file owned by the caller.
async fn stage_payload(bytes: &[u8]) -> Result<NamedTempFile, DecodeFailure> {
    let staged = tempfile::Builder::new()
        .prefix("exrframe-")
        .suffix(".exr")
        .tempfile()
        .map_err(DecodeFailure::Materialise)?;
    tokio::fs::write(staged.path(), bytes)
        .await
        .map_err(DecodeFailure::Materialise)?;
    Ok(staged)
}

/// Lossy UTF-8 rendering of at most the last `limit` bytes, trimmed.
fn tail_lossy(bytes: &[u8], limit: usize) -> String {
    let start = bytes.len().saturating_sub(limit);
    String::from_utf8_lossy(&bytes[start..]).trim().to_owned()
}
