//! Shared fixtures for the integration tests: a seeded in-memory store, a
//! hand-driven clock and a gateway that records notifications.
//!
//! Each file under `tests/` is its own crate, so helpers one file does not
//! use would otherwise warn.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use travel_booking::config::{
    AppConfig, BookingConfig, CircuitBreakerConfig, Config, DatabaseConfig, NotificationConfig,
    RedisConfig, SweeperConfig,
};
use travel_booking::models::{FlightLeg, HotelRate, NewBooking, Occupancy, PackageConfig};
use travel_booking::services::clock::ManualClock;
use travel_booking::services::notification::{
    NotificationError, NotificationEvent, NotificationGateway, NotificationKind,
};
use travel_booking::store::{MemoryStore, ReferenceData};
use travel_booking::AppState;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

pub fn departure() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
}

pub fn test_config(batch_size: i64) -> Config {
    Config {
        app: AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            environment: "test".into(),
            rust_log: "travel_booking=debug".into(),
            log_format: "text".into(),
        },
        database: DatabaseConfig { url: None, pool_size: 1 },
        redis: RedisConfig { url: None, quote_ttl_seconds: 60 },
        booking: BookingConfig::default(),
        sweeper: SweeperConfig { batch_size, ..SweeperConfig::default() },
        notification: NotificationConfig { webhook_url: None, timeout_seconds: 2 },
        circuit_breaker: CircuitBreakerConfig { failure_threshold: 3, timeout_seconds: 60 },
    }
}

/// Notification sink that keeps every event it is handed.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingGateway {
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    /// Dispatch is fire-and-forget, so give the spawned tasks a moment.
    pub async fn wait_for(&self, count: usize) -> Vec<NotificationKind> {
        for _ in 0..100 {
            if self.events.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.kinds()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub notifications: RecordingGateway,
    pub package_id: Uuid,
    pub outbound_id: Uuid,
    pub return_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(10, true, 100, None).await
    }

    pub async fn with_seats(seats: i32) -> Self {
        Self::build(seats, true, 100, None).await
    }

    /// Package whose flights are template legs with no inventory.
    pub async fn with_template_legs() -> Self {
        Self::build(0, false, 100, None).await
    }

    pub async fn with_batch_size(seats: i32, batch_size: i64) -> Self {
        Self::build(seats, true, batch_size, None).await
    }

    pub async fn with_notifier(notifier: Arc<dyn NotificationGateway>) -> Self {
        Self::build(10, true, 100, Some(notifier)).await
    }

    async fn build(
        seats: i32,
        block: bool,
        batch_size: i64,
        notifier: Option<Arc<dyn NotificationGateway>>,
    ) -> Self {
        let store = MemoryStore::new();
        let hotel_id = Uuid::new_v4();
        let group = Uuid::new_v4();

        let outbound = leg("XQ400", "HAM", "AYT", departure(), seats, block, group);
        let inbound = leg("XQ401", "AYT", "HAM", departure() + Duration::days(3), seats, block, group);
        let package = PackageConfig {
            id: Uuid::new_v4(),
            name: "Antalya long weekend".into(),
            hotel_id,
            hotel_name: "Lara Beach Resort".into(),
            room_type: "DBL".into(),
            outbound_leg_id: outbound.id,
            return_leg_id: Some(inbound.id),
            nights: 3,
            transfer_included: true,
            transfer_price: 0,
            service_charge: 0,
            profit_margin_percent: 10.0,
            revision: 1,
        };
        let rate = HotelRate {
            id: Uuid::new_v4(),
            hotel_id,
            room_type: "DBL".into(),
            board: "AI".into(),
            from_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            till_date: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            single: 6_000,
            double: 8_000,
            extra_bed: 3_000,
            paying_kids_age: "7-11".into(),
            payment_kids: 2_000,
        };

        let (package_id, outbound_id, return_id) = (package.id, outbound.id, inbound.id);
        store.insert_leg(outbound).await;
        store.insert_leg(inbound).await;
        store.insert_package(package).await;
        store.insert_rate(rate).await;

        let clock = Arc::new(ManualClock::new(start_time()));
        let notifications = RecordingGateway::default();
        let notifier = notifier.unwrap_or_else(|| Arc::new(notifications.clone()));

        let state = AppState::assemble(test_config(batch_size), store.clone(), None, notifier, clock.clone());

        Self {
            state: Arc::new(state),
            store,
            clock,
            notifications,
            package_id,
            outbound_id,
            return_id,
        }
    }

    pub fn booking_request(&self, occupancy: Occupancy) -> NewBooking {
        let name: String = Name().fake();
        let email: String = SafeEmail().fake();
        NewBooking {
            package_id: self.package_id,
            occupancy,
            customer_name: name,
            customer_email: email,
            customer_phone: "+49 40 1234567".into(),
            notes: None,
            excursions: Vec::new(),
        }
    }

    pub async fn available(&self, leg_id: Uuid) -> i32 {
        self.store.flight_leg(leg_id).await.unwrap().unwrap().available_seats
    }
}

fn leg(
    number: &str,
    origin: &str,
    destination: &str,
    date: NaiveDate,
    seats: i32,
    block: bool,
    group: Uuid,
) -> FlightLeg {
    FlightLeg {
        id: Uuid::new_v4(),
        flight_number: number.into(),
        origin: origin.into(),
        destination: destination.into(),
        departure_date: date,
        price_per_seat: 12_000,
        total_seats: seats,
        available_seats: seats,
        is_block_seat: block,
        block_group_id: Some(group),
    }
}
