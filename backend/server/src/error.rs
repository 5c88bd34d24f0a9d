use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sos_core::{ChannelError, PhoneError};
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Location required")]
    InvalidLocation,

    #[error("sosId required")]
    MissingIncidentId,

    #[error("Phone number is required")]
    MissingPhone,

    #[error("{0}")]
    InvalidPhone(#[from] PhoneError),

    #[error("Not authorized, no token")]
    Unauthorized,

    #[error("Not authorized")]
    Forbidden,

    #[error("SOS not found")]
    NotFound,

    #[error("Failed to send SMS")]
    Channel(#[from] ChannelError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload
            | AppError::InvalidLocation
            | AppError::MissingIncidentId
            | AppError::MissingPhone
            | AppError::InvalidPhone(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Channel(_) | AppError::Store(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Channel(e) => {
                error!("Channel error: {e}");
                self.to_string()
            }
            AppError::Store(_) | AppError::InternalError(_) => {
                error!("{self}");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
