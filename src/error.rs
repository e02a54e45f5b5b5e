//! Canonical error taxonomy for one conversion request.
//!
//! Every failure in the processing pipeline is folded into a
//! [`ProcessError`] before it reaches a transport adapter. Adapters then use
//! [`ProcessError::category`] to pick the caller-visible classification and
//! [`ProcessError::user_message`] for the text they send back.

use thiserror::Error;

use crate::{decode::DecodeFailure, encode::EncodeError, validate::ValidationError};

/// Prefix attached to caller-visible messages for client-caused failures.
pub const INVALID_INPUT_PREFIX: &str = "Invalid EXR: ";

/// Prefix attached to caller-visible messages for internal failures.
pub const INTERNAL_PREFIX: &str = "Processing error: ";

/// Failure of a single conversion.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The payload failed validation or the decoder rejected it.
    #[error("{0}")]
    InvalidInput(#[source] InputFault),
    /// The isolated decoder timed out, crashed, or could not be run.
    #[error("{0}")]
    DecodeUnavailable(#[source] DecodeFailure),
    /// The PNG encoder could not produce bytes.
    #[error("{0}")]
    EncodeFailure(#[source] EncodeError),
    /// No bytes were received.
    #[error("No data received")]
    EmptyPayload,
}

/// Client-caused fault carried by [`ProcessError::InvalidInput`].
#[derive(Debug, Error)]
pub enum InputFault {
    /// Structural validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The decoder ran and rejected the file.
    #[error(transparent)]
    Rejected(DecodeFailure),
}

/// Caller-visible classification of a failure.
#[derive(bincode::Encode, bincode::Decode, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The request was at fault; retrying the same bytes will not help.
    InvalidInput,
    /// The service failed to produce output.
    Internal,
}

impl ProcessError {
    /// Classification reported to callers.
    ///
    /// Decoder timeouts and crashes are reported as invalid input: the usual
    /// cause is a hostile or truncated file.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) | Self::DecodeUnavailable(_) | Self::EmptyPayload => {
                ErrorCategory::InvalidInput
            }
            Self::EncodeFailure(_) => ErrorCategory::Internal,
        }
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DecodeUnavailable(_) => "decode_unavailable",
            Self::EncodeFailure(_) => "encode_failure",
            Self::EmptyPayload => "empty_payload",
        }
    }

    /// Message sent back to the caller.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyPayload => self.to_string(),
            Self::InvalidInput(_) | Self::DecodeUnavailable(_) => {
                format!("{INVALID_INPUT_PREFIX}{self}")
            }
            Self::EncodeFailure(_) => format!("{INTERNAL_PREFIX}{self}"),
        }
    }
}

impl From<ValidationError> for ProcessError {
    fn from(error: ValidationError) -> Self {
        if error == ValidationError::Empty {
            Self::EmptyPayload
        } else {
            Self::InvalidInput(InputFault::Validation(error))
        }
    }
}

impl From<DecodeFailure> for ProcessError {
    fn from(error: DecodeFailure) -> Self {
        if error.is_input_rejection() {
            Self::InvalidInput(InputFault::Rejected(error))
        } else {
            Self::DecodeUnavailable(error)
        }
    }
}

impl From<EncodeError> for ProcessError {
    fn from(error: EncodeError) -> Self { Self::EncodeFailure(error) }
}
