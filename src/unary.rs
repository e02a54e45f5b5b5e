//! Single-call conversion and the health endpoint.

use tracing::{Instrument, info, info_span};

use crate::{
    error::ErrorCategory,
    pipeline::Pipeline,
    protocol::{ConvertRequest, ConvertResponse, HealthResponse, Rejection, SERVICE_NAME},
    session::SessionId,
};

/// Message returned when a unary request carries no bytes.
pub const MISSING_PAYLOAD: &str = "exr_data is required";

/// Convert a complete payload in one call.
///
/// # Errors
///
/// Returns a [`Rejection`] carrying the failure category and a message
/// naming the specific reason.
pub async fn convert(pipeline: &Pipeline, request: ConvertRequest) -> Result<ConvertResponse, Rejection> {
    let id = SessionId::next();
    if request.exr_data.is_empty() {
        return Err(Rejection {
            category: ErrorCategory::InvalidInput,
            message: MISSING_PAYLOAD.to_owned(),
        });
    }
    info!(request = %id, bytes = request.exr_data.len(), "unary conversion");

    match pipeline
        .process(&request.exr_data)
        .instrument(info_span!("convert", request = %id))
        .await
    {
        Ok(converted) => Ok(ConvertResponse {
            message: format!(
                "Converted to {}x{} PNG ({} bytes)",
                converted.width,
                converted.height,
                converted.png.len()
            ),
            png_data: converted.png,
            width: converted.width,
            height: converted.height,
        }),
        Err(e) => Err(Rejection {
            category: e.category(),
            message: e.user_message(),
        }),
    }
}

/// Health report for this process.
#[must_use]
pub fn health() -> HealthResponse {
    HealthResponse {
        healthy: true,
        service_name: SERVICE_NAME.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RejectingDecoder, grey_pipeline, plausible_exr};

    #[tokio::test]
    async fn converts_whole_payload() {
        let pipeline = grey_pipeline(7, 5);
        let response = convert(
            &pipeline,
            ConvertRequest {
                exr_data: plausible_exr(300),
            },
        )
        .await
        .expect("convert");
        assert_eq!((response.width, response.height), (7, 5));
        assert!(response.message.starts_with("Converted to 7x5 PNG"));
        assert_eq!(response.png_data[1..4], *b"PNG");
    }

    #[tokio::test]
    async fn empty_payload_is_invalid_input() {
        let pipeline = grey_pipeline(1, 1);
        let rejection = convert(&pipeline, ConvertRequest::default())
            .await
            .expect_err("empty");
        assert_eq!(rejection.category, ErrorCategory::InvalidInput);
        assert_eq!(rejection.message, MISSING_PAYLOAD);
    }

    #[tokio::test]
    async fn undecodable_minimum_payload_is_invalid_input() {
        let pipeline = Pipeline::new(RejectingDecoder);
        let rejection = convert(
            &pipeline,
            ConvertRequest {
                exr_data: plausible_exr(100),
            },
        )
        .await
        .expect_err("rejected");
        assert_eq!(rejection.category, ErrorCategory::InvalidInput);
        assert!(rejection.message.starts_with("Invalid EXR: decoder rejected file"));
    }

    #[test]
    fn health_names_the_service() {
        let report = health();
        assert!(report.healthy);
        assert_eq!(report.service_name, "exr-extractor");
        assert_eq!(report.version, env!("CARGO_PKG_VERSION"));
    }
}
