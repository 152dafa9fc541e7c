//! The HTTP front end: request parsing, error mapping and routes

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

pub mod input;
pub mod protocol;
pub mod routes;

/// Errors a request can fail with, mapped onto HTTP responses
#[derive(Debug, Error)]
pub enum WebError {
    /// Neither a file upload nor a JSON payload carried an image
    #[error("No image data provided")]
    InputMissing,

    #[error("Image payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Any failure while decoding, running the model or encoding
    #[error("Background removal failed: {0:#}")]
    Processing(#[from] anyhow::Error),
}

/// Any origin may call the service. Browsers get a wildcard
/// `Access-Control-Allow-Origin` and no credentials.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allow_any_method()
        .allow_any_header()
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(protocol::ErrorResponse {
            error: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WebError::InputMissing => StatusCode::BAD_REQUEST,
            WebError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            WebError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<base64::DecodeError> for WebError {
    fn from(err: base64::DecodeError) -> Self {
        WebError::Processing(anyhow::Error::new(err).context("invalid base64 image data"))
    }
}

impl From<image::ImageError> for WebError {
    fn from(err: image::ImageError) -> Self {
        WebError::Processing(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::ResponseError;
    use anyhow::anyhow;

    #[actix_web::test]
    async fn missing_input_is_a_bad_request() {
        let response = WebError::InputMissing.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"No image data provided"}"#);
    }

    #[test]
    fn processing_message_carries_the_cause() {
        let err = WebError::from(anyhow!("out of memory").context("inference failed"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Background removal failed: inference failed: out of memory"
        );
    }

    #[test]
    fn oversized_payload() {
        let err = WebError::PayloadTooLarge { limit: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.to_string(), "Image payload exceeds the 10 byte limit");
    }
}
