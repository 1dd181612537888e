use crate::verify::VerifyError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mailtrack_core::ErrorKind;
use mailtrack_core::core::auth::error::AuthError;
use mailtrack_core::core::images::error::ImageError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] mailtrack_core::Error),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Wrong password")]
    LoginFailed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Core(e) => core_response(e),
            ServerError::Verification(e) => {
                tracing::warn!(error = %e, "human verification failed");
                (
                    StatusCode::BAD_REQUEST,
                    "Verification failed, please retry".into(),
                )
            }
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ServerError::LoginFailed => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn core_response(e: &mailtrack_core::Error) -> (StatusCode, String) {
    use mailtrack_core::Error;

    match e {
        Error::Image(ImageError::PayloadTooLarge { .. } | ImageError::TooManyPixels { .. }) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string());
        }
        Error::Image(ImageError::UnsupportedMediaType(_)) => {
            return (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string());
        }
        _ => {}
    }

    match e.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, e.to_string()),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "Not found".into()),
        ErrorKind::Authorization => {
            let message = match e {
                Error::Auth(AuthError::Rejected) => AuthError::Rejected.to_string(),
                Error::Auth(inner @ (AuthError::NotYetAvailable | AuthError::NoLongerAvailable)) => {
                    inner.to_string()
                }
                _ => AuthError::Denied.to_string(),
            };
            (StatusCode::FORBIDDEN, message)
        }
        ErrorKind::Upstream => (
            StatusCode::BAD_REQUEST,
            "Verification failed, please retry".into(),
        ),
        ErrorKind::Codec => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        ErrorKind::Persistence => {
            tracing::error!(error = %e, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".into(),
            )
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
