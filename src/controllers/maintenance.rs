use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/maintenance/expire-holds", post(expire_holds))
}

// POST /api/maintenance/expire-holds
// Manual trigger for the sweeper; safe to call while the background one runs.
async fn expire_holds(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual hold expiry requested");
    Json(state.sweeper.run_once().await)
}
