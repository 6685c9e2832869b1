use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled flight instance. Block-seat legs carry finite inventory;
/// template legs (`is_block_seat = false` or `total_seats = 0`) are routing only.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct FlightLeg {
    pub id: Uuid,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    /// Complete round-trip price per person in minor units (never doubled).
    pub price_per_seat: i64,
    pub total_seats: i32,
    pub available_seats: i32,
    pub is_block_seat: bool,
    pub block_group_id: Option<Uuid>,
}

impl FlightLeg {
    pub fn tracks_inventory(&self) -> bool {
        self.is_block_seat && self.total_seats > 0
    }
}
