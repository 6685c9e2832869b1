use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::Occupancy;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/packages/{id}/quote", get(quote_package))
}

#[derive(Debug, Deserialize)]
struct QuoteQuery {
    adults: u32,
    #[serde(default)]
    children: u32,
    /// Comma separated, e.g. `child_ages=4,9`.
    child_ages: Option<String>,
}

impl QuoteQuery {
    fn occupancy(&self) -> Result<Occupancy, BookingError> {
        let ages = match self.child_ages.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(|age| {
                    age.trim()
                        .parse::<u32>()
                        .map_err(|_| BookingError::Validation(format!("invalid child age '{}'", age.trim())))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(Occupancy::new(self.adults, self.children, ages))
    }
}

// GET /api/packages/{id}/quote?adults=2&children=1&child_ages=8
async fn quote_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<impl IntoResponse, BookingError> {
    let occupancy = query.occupancy()?;
    Ok(Json(state.quotes.quote(id, &occupancy).await?))
}
