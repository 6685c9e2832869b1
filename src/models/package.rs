use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Package configuration from the reference data store.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PackageConfig {
    pub id: Uuid,
    pub name: String,
    pub hotel_id: Uuid,
    pub hotel_name: String,
    pub room_type: String,
    pub outbound_leg_id: Uuid,
    pub return_leg_id: Option<Uuid>,
    pub nights: i32,
    pub transfer_included: bool,
    pub transfer_price: i64,
    pub service_charge: i64,
    pub profit_margin_percent: f64,
    /// Bumped by reference-data writers whenever rates, flight prices or
    /// the package itself change; part of the quote cache key.
    pub revision: i64,
}

/// Derived price for a (package, occupancy) tuple. Never hand-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagePriceQuote {
    pub package_id: Uuid,
    pub revision: i64,
    pub adults: u32,
    pub children: u32,
    pub child_ages: Vec<u32>,
    pub travel_date: NaiveDate,
    pub nights: u32,
    pub flight_price: i64,
    pub hotel_price: i64,
    pub transfer_price: i64,
    pub service_charge: i64,
    pub subtotal: i64,
    pub total_price: i64,
    pub display_price: i64,
    pub hotel_name: String,
    pub board: String,
    pub room_type: String,
    pub computed_at: DateTime<Utc>,
}
