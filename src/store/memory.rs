use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{AuditStore, BookingStore, ReferenceData, StoreError, StoreResult, StoreTx};
use crate::models::{AuditRecord, Booking, BookingStatus, FlightLeg, HotelRate, PackageConfig};

#[derive(Debug, Clone, Default)]
struct Tables {
    legs: HashMap<Uuid, FlightLeg>,
    bookings: HashMap<Uuid, Booking>,
    reservation_seq: i64,
}

#[derive(Debug, Default)]
struct Reference {
    packages: HashMap<Uuid, PackageConfig>,
    rates: Vec<HotelRate>,
}

/// Process-local store used in development and tests.
///
/// A transaction holds the table lock exclusively from `begin` to commit or
/// drop, works on a staged copy, and publishes it on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    reference: Arc<RwLock<Reference>>,
    audits: Arc<Mutex<Vec<AuditRecord>>>,
    fail_audits: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_leg(&self, leg: FlightLeg) {
        self.tables.lock().await.legs.insert(leg.id, leg);
    }

    pub async fn insert_package(&self, package: PackageConfig) {
        self.reference.write().await.packages.insert(package.id, package);
    }

    pub async fn insert_rate(&self, rate: HotelRate) {
        self.reference.write().await.rates.push(rate);
    }

    /// Makes every audit write fail, to exercise the best-effort path.
    pub fn set_audit_outage(&self, failing: bool) {
        self.fail_audits.store(failing, Ordering::SeqCst);
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_leg(&mut self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>> {
        Ok(self.staged.legs.get(&leg_id).cloned())
    }

    async fn take_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>> {
        match self.staged.legs.get_mut(&leg_id) {
            Some(leg) if leg.is_block_seat && leg.available_seats >= seats => {
                leg.available_seats -= seats;
                Ok(Some(leg.available_seats))
            }
            _ => Ok(None),
        }
    }

    async fn return_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>> {
        match self.staged.legs.get_mut(&leg_id) {
            Some(leg) if leg.is_block_seat => {
                leg.available_seats = (leg.available_seats + seats).min(leg.total_seats);
                Ok(Some(leg.available_seats))
            }
            _ => Ok(None),
        }
    }

    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.staged.bookings.get(&booking_id).cloned())
    }

    async fn next_reservation_number(&mut self) -> StoreResult<i64> {
        self.staged.reservation_seq += 1;
        Ok(self.staged.reservation_seq)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let duplicate_code = self
            .staged
            .bookings
            .values()
            .any(|b| b.reservation_code == booking.reservation_code);
        if duplicate_code || self.staged.bookings.contains_key(&booking.id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate booking {} / {}",
                booking.id, booking.reservation_code
            )));
        }
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let existing = self
            .staged
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::Corrupt(format!("booking {} vanished mid-transaction", booking.id)))?;
        let line_items = (
            std::mem::take(&mut existing.flights),
            std::mem::take(&mut existing.hotels),
            std::mem::take(&mut existing.transfers),
            std::mem::take(&mut existing.excursions),
        );
        *existing = booking.clone();
        existing.flights = line_items.0;
        existing.hotels = line_items.1;
        existing.transfers = line_items.2;
        existing.excursions = line_items.3;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn booking_by_code(&self, code: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.reservation_code == code)
            .cloned())
    }

    async fn expired_soft_bookings(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let tables = self.tables.lock().await;
        let mut ids: Vec<Uuid> = tables
            .bookings
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.id)
            .filter(|id| after.map_or(true, |cursor| *id > cursor))
            .collect();
        ids.sort();
        ids.truncate(limit.max(0) as usize);
        Ok(ids)
    }

    async fn bookings_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut due: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Soft && b.reminder_sent_at.is_none())
            .filter(|b| b.expires_at.is_some_and(|at| at > now && at <= until))
            .cloned()
            .collect();
        due.sort_by_key(|b| b.expires_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.bookings.get_mut(&booking_id) {
            Some(b) if b.status == BookingStatus::Soft && b.reminder_sent_at.is_none() => {
                b.reminder_sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReferenceData for MemoryStore {
    async fn flight_leg(&self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>> {
        Ok(self.tables.lock().await.legs.get(&leg_id).cloned())
    }

    async fn package(&self, package_id: Uuid) -> StoreResult<Option<PackageConfig>> {
        Ok(self.reference.read().await.packages.get(&package_id).cloned())
    }

    async fn hotel_rates(&self, hotel_id: Uuid, room_type: &str) -> StoreResult<Vec<HotelRate>> {
        Ok(self
            .reference
            .read()
            .await
            .rates
            .iter()
            .filter(|r| r.hotel_id == hotel_id && r.room_type == room_type)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, record: &AuditRecord) -> StoreResult<()> {
        if self.fail_audits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit table offline".to_string()));
        }
        let mut audits = self.audits.lock().await;
        if audits
            .iter()
            .any(|r| r.booking_id == record.booking_id && r.prev_hash == record.prev_hash)
        {
            return Err(StoreError::Conflict(format!(
                "booking {} already has a successor to {:?}",
                record.booking_id, record.prev_hash
            )));
        }
        audits.push(record.clone());
        Ok(())
    }

    async fn latest_audit_hash(&self, booking_id: Uuid) -> StoreResult<Option<String>> {
        if self.fail_audits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit table offline".to_string()));
        }
        Ok(self
            .audits
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.booking_id == booking_id)
            .map(|r| r.hash.clone()))
    }

    async fn audit_trail(&self, booking_id: Uuid) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .audits
            .lock()
            .await
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect())
    }
}
