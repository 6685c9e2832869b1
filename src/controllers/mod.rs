pub mod bookings;
pub mod maintenance;
pub mod packages;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(bookings::routes())
        .merge(packages::routes())
        .merge(maintenance::routes())
}

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = match &state.db {
        Some(db) => match db.ping().await {
            Ok(()) => "postgres",
            Err(e) => {
                tracing::error!("Health check: database unreachable: {:?}", e);
                "unavailable"
            }
        },
        None => "memory",
    };
    let redis = match &state.redis {
        Some(redis) if redis.ping().await.is_ok() => "ok",
        Some(_) => "unavailable",
        None => "disabled",
    };

    let status = if store == "unavailable" { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (status, Json(json!({ "status": if status.is_success() { "ok" } else { "degraded" }, "store": store, "redis": redis })))
}
