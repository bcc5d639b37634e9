use crate::{storage::StorageError, vision::VisionError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INTERNAL_ERROR_DETAIL: &str = "Internal server error";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Every failure an API route can report. Lower layers convert into this
/// enum and `into_response` is the only place statuses are chosen.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Vision(#[from] VisionError),
    /// Opaque to the caller: the message is logged, the body is generic.
    #[error("{detail}: {message}")]
    Internal {
        detail: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn internal(detail: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            detail,
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Vision(err) => match err {
                VisionError::NotConfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                VisionError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                VisionError::Status { .. } | VisionError::Transport(_) => StatusCode::BAD_GATEWAY,
                VisionError::InvalidResponse(_) | VisionError::ClientBuild(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg.clone(),
            ApiError::Vision(err) => match err {
                VisionError::NotConfigured { .. } | VisionError::Timeout => err.to_string(),
                VisionError::Status { status, .. } => format!("Vision API error: {}", status),
                VisionError::Transport(_) => "Failed to connect to vision API".to_string(),
                VisionError::InvalidResponse(_) | VisionError::ClientBuild(_) => {
                    INTERNAL_ERROR_DETAIL.to_string()
                }
            },
            ApiError::Internal { detail, .. } => detail.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFilename(name) => {
                ApiError::BadRequest(format!("Invalid filename: {:?}", name))
            }
            StorageError::Io { .. } => ApiError::internal("Failed to store file", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::info!("Request rejected with {}: {}", status, self);
        }

        (status, Json(ErrorBody { detail: self.detail() })).into_response()
    }
}
