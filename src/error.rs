use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::models::BookingStatus;
use crate::services::inventory::InventoryError;
use crate::services::pricing::PricingError;
use crate::store::StoreError;

/// Caller-visible failures of the booking engine.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient inventory on leg {leg_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        leg_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("cannot {action} a booking in status {status}")]
    InvalidState {
        status: BookingStatus,
        action: &'static str,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unsupported occupancy: {adults} adults (supported: 1-4)")]
    UnsupportedOccupancy { adults: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "ValidationError",
            BookingError::InsufficientInventory { .. } => "InsufficientInventory",
            BookingError::InvalidState { .. } => "InvalidState",
            BookingError::NotFound(_) => "NotFound",
            BookingError::UnsupportedOccupancy { .. } => "UnsupportedOccupancy",
            BookingError::Store(_) => "InternalError",
        }
    }

    pub fn booking_not_found(id: Uuid) -> Self {
        BookingError::NotFound(format!("booking {}", id))
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::LegNotFound(leg_id) => BookingError::NotFound(format!("flight leg {}", leg_id)),
            InventoryError::Insufficient { leg_id, requested, available } => {
                BookingError::InsufficientInventory { leg_id, requested, available }
            }
            InventoryError::InvalidQuantity(seats) => {
                BookingError::Validation(format!("seat quantity must be positive, got {}", seats))
            }
            InventoryError::Store(e) => BookingError::Store(e),
        }
    }
}

impl From<PricingError> for BookingError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnsupportedOccupancy { adults } => BookingError::UnsupportedOccupancy { adults },
            other => BookingError::Validation(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BookingError::Validation(err.to_string())
    }
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = match &self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::InsufficientInventory { .. } | BookingError::InvalidState { .. } => StatusCode::CONFLICT,
            BookingError::UnsupportedOccupancy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            BookingError::Store(e) => {
                tracing::error!("Store failure while handling request: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiError { success: false, error: self.kind(), message };
        (status, Json(body)).into_response()
    }
}
