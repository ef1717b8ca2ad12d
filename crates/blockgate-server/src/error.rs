use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blockgate_upload::UploadError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] blockgate_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// A failed upload operation, rendered as a one-line plain-text response.
///
/// Internal errors are logged with the request ID and only the ID is shown
/// to the client.
#[derive(Debug)]
pub struct ApiError {
    error: UploadError,
    request_id: String,
}

impl ApiError {
    pub fn new(error: UploadError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            UploadError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UploadError::NotFound(_) => StatusCode::NOT_FOUND,
            UploadError::Conflict(_) => StatusCode::CONFLICT,
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            UploadError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            UploadError::Storage { .. } | UploadError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.error.is_client_error() {
            warn!(request_id = %self.request_id, status = status.as_u16(), err = %self.error, "request failed");
            self.error.to_string()
        } else {
            error!(request_id = %self.request_id, err = %self.error, "internal error");
            format!("internal server error (id {})", self.request_id)
        };
        (status, format!("{message}\n")).into_response()
    }
}
