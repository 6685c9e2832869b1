use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{BookingPatch, NewBooking, PaymentMeta, RequestContext};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/code/{code}", get(get_booking_by_code))
        .route("/bookings/{id}", get(get_booking).patch(modify_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/payment", post(record_payment))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/audit", get(audit_trail))
}

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(req): Json<NewBooking>,
) -> Result<impl IntoResponse, BookingError> {
    let booking = state.bookings.create_soft_booking(req, &ctx).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.view_booking(id, &ctx).await?))
}

// GET /api/bookings/code/{code}
async fn get_booking_by_code(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.booking_by_code(&code, &ctx).await?))
}

// POST /api/bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.confirm(id, &ctx).await?))
}

// POST /api/bookings/{id}/payment
async fn record_payment(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payment): Json<PaymentMeta>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.mark_paid(id, &ctx, payment).await?))
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

// POST /api/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.cancel(id, &ctx, req.reason).await?))
}

// PATCH /api/bookings/{id}
async fn modify_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<BookingPatch>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.modify(id, &ctx, patch).await?))
}

// GET /api/bookings/{id}/audit
async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BookingError> {
    Ok(Json(state.bookings.audit_trail(id).await?))
}
