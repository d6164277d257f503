use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{fees::FeeError, invitations::InvitationError, store::StoreError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal Server Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            StoreError::Malformed(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<InvitationError> for ApiError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::NotFound(_) => ApiError::NotFound(err.to_string()),
            InvitationError::Revoked(_)
            | InvitationError::Expired(_)
            | InvitationError::Exhausted(_) => ApiError::Gone(err.to_string()),
            InvitationError::Invalid(_) => ApiError::InvalidRequest(err.to_string()),
            InvitationError::CodeSpaceExhausted(_) => ApiError::Conflict(err.to_string()),
            InvitationError::Store(e) => e.into(),
        }
    }
}

impl From<FeeError> for ApiError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::InvalidMonth(_) => ApiError::InvalidRequest(err.to_string()),
            FeeError::NotFound(_) => ApiError::NotFound(err.to_string()),
            FeeError::NoFeeBand(_) => ApiError::Unprocessable(err.to_string()),
            FeeError::Store(e) => e.into(),
        }
    }
}
