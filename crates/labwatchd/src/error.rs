//! HTTP-facing errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labwatch_common::ErrorBody;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::actions::ActionError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or parameters
    #[error("{0}")]
    BadRequest(String),

    /// Wrong or missing shared secret
    #[error("Invalid Authority")]
    Unauthorized,

    /// Anything unexpected; the message is generic, details go to the log
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ActionError> for ApiError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::InvalidAction(_) | ActionError::InvalidEntity(_) => {
                ApiError::BadRequest(e.to_string())
            }
            _ => ApiError::Internal("Command execution failed".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Decode a JSON body, mapping any failure to a 400 with `message`
pub fn parse_json<T: DeserializeOwned>(body: &[u8], message: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request(message))
}
