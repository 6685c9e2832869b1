//! Persistence seams for the booking engine.
//!
//! Every lifecycle call runs its inventory and status mutations inside one
//! [`StoreTx`]. Dropping a transaction without calling [`StoreTx::commit`]
//! rolls it back. Audit rows are written through [`AuditStore`] after the
//! transaction has committed and are never part of it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AuditRecord, Booking, FlightLeg, HotelRate, PackageConfig};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A unit of work against the authoritative store.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads a leg and holds it for the rest of the transaction.
    async fn lock_leg(&mut self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>>;

    /// Compare-and-swap decrement. Returns the remaining seats, or `None` when
    /// fewer than `seats` were available (nothing is changed in that case).
    async fn take_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>>;

    /// Increment clamped to `total_seats`. Returns the new available count.
    async fn return_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>>;

    /// Reads a booking with its line items and holds it for the rest of the transaction.
    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn next_reservation_number(&mut self) -> StoreResult<i64>;

    /// Inserts the booking row and all of its line items.
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Updates the booking row. Line items are immutable after creation.
    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn booking_by_code(&self, code: &str) -> StoreResult<Option<Booking>>;

    /// Ids of SOFT bookings with `expires_at <= now`, ordered by id, strictly after `after`.
    async fn expired_soft_bookings(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>>;

    /// SOFT bookings expiring in `(now, until]` that have not been reminded yet.
    async fn bookings_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>>;

    /// Sets `reminder_sent_at` only if it is still unset and the booking is still SOFT.
    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
}

/// Read-only reference data. The engine never writes these.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn flight_leg(&self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>>;

    async fn package(&self, package_id: Uuid) -> StoreResult<Option<PackageConfig>>;

    async fn hotel_rates(&self, hotel_id: Uuid, room_type: &str) -> StoreResult<Vec<HotelRate>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the booking already has a
    /// record chained to `record.prev_hash`.
    async fn append_audit(&self, record: &AuditRecord) -> StoreResult<()>;

    async fn latest_audit_hash(&self, booking_id: Uuid) -> StoreResult<Option<String>>;

    /// Oldest first.
    async fn audit_trail(&self, booking_id: Uuid) -> StoreResult<Vec<AuditRecord>>;
}
