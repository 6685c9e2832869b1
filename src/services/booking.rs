//! Booking lifecycle.
//!
//! ```text
//! SOFT ──confirm──▶ CONFIRMED ──mark_paid──▶ PAID
//!   │                   │
//!   └──cancel/expiry──▶ CANCELLED ◀──cancel──┘
//! ```
//!
//! Every operation runs inventory and status changes in one store
//! transaction. Audit rows and notifications happen after commit and can
//! never undo or block it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::BookingConfig;
use crate::error::BookingError;
use crate::models::{
    AuditAction, AuditRecord, Booking, BookingPatch, BookingStatus, ExcursionBooking, FlightBooking,
    HotelBooking, NewBooking, PaymentMeta, RequestContext, TransferBooking, Transition,
};
use crate::services::audit::{AuditEntry, AuditLog};
use crate::services::clock::Clock;
use crate::services::inventory::InventoryLedger;
use crate::services::notification::{self, NotificationEvent, NotificationGateway, NotificationKind};
use crate::services::pricing::round_to_nearest_nine;
use crate::services::quotes::QuoteService;
use crate::store::{BookingStore, StoreTx};

const HOLD_EXPIRED: &str = "hold expired";

/// Who asked for a cancellation. Expiry cancels are idempotent; user cancels are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOrigin {
    User,
    Expiry,
}

pub fn reservation_code(prefix: &str, number: i64) -> String {
    format!("{}-{:04}", prefix, number)
}

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    quotes: Arc<QuoteService>,
    ledger: InventoryLedger,
    audit: Arc<AuditLog>,
    notifier: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        quotes: Arc<QuoteService>,
        audit: Arc<AuditLog>,
        notifier: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            store,
            quotes,
            ledger: InventoryLedger::new(),
            audit,
            notifier,
            clock,
            config,
        }
    }

    /// Prices the package, takes seats on its block legs and stores a SOFT
    /// hold that expires after the configured hold duration.
    pub async fn create_soft_booking(
        &self,
        input: NewBooking,
        ctx: &RequestContext,
    ) -> Result<Booking, BookingError> {
        input.validate()?;
        input.occupancy.check().map_err(BookingError::Validation)?;

        // Pure and read-only, so it stays outside the transaction.
        let priced = self.quotes.price_package(input.package_id, &input.occupancy).await?;

        let now = self.clock.now();
        if priced.travel_date < now.date_naive() {
            return Err(BookingError::Validation(format!(
                "departure date {} is in the past",
                priced.travel_date
            )));
        }

        let seats = i32::try_from(input.occupancy.seats_required())
            .map_err(|_| BookingError::Validation("too many travellers".to_string()))?;

        let mut tx = self.store.begin().await?;
        let outcomes = self.ledger.reserve_legs(tx.as_mut(), &priced.leg_ids(), seats).await?;
        let number = tx.next_reservation_number().await?;

        let booking_id = Uuid::new_v4();
        let legs = std::iter::once(&priced.outbound).chain(priced.inbound.as_ref());
        let flights: Vec<FlightBooking> = legs
            .map(|leg| FlightBooking {
                id: Uuid::new_v4(),
                booking_id,
                leg_id: leg.id,
                passengers: seats,
                price_per_seat: leg.price_per_seat,
                block_seat: outcomes
                    .iter()
                    .any(|(leg_id, outcome)| *leg_id == leg.id && outcome.is_tracked()),
            })
            .collect();

        let nights = priced.package.nights;
        let hotels = vec![HotelBooking {
            id: Uuid::new_v4(),
            booking_id,
            hotel_id: priced.package.hotel_id,
            hotel_name: priced.package.hotel_name.clone(),
            room_type: priced.package.room_type.clone(),
            board: priced.rate.board.clone(),
            check_in: priced.travel_date,
            nights,
            price: priced.breakdown.hotel,
        }];

        let travellers = (input.occupancy.adults + input.occupancy.children) as i32;
        let transfers = if priced.package.transfer_included {
            Vec::new()
        } else {
            vec![TransferBooking {
                id: Uuid::new_v4(),
                booking_id,
                description: format!("Airport transfer to {}", priced.package.hotel_name),
                passengers: travellers,
                price: priced.breakdown.transfer,
            }]
        };

        // Excursions are passed through at cost, after the margin.
        let excursions: Vec<ExcursionBooking> = input
            .excursions
            .iter()
            .map(|e| ExcursionBooking {
                id: Uuid::new_v4(),
                booking_id,
                name: e.name.clone(),
                excursion_date: e.date,
                participants: e.participants,
                price: e.price_per_person * e.participants as i64,
            })
            .collect();
        let excursion_total: i64 = excursions.iter().map(|e| e.price).sum();
        let total_amount = priced.breakdown.total + excursion_total;

        let booking = Booking {
            id: booking_id,
            reservation_code: reservation_code(&self.config.reservation_prefix, number),
            status: BookingStatus::Soft,
            package_id: Some(priced.package.id),
            total_amount,
            display_price: round_to_nearest_nine(total_amount as f64 / 100.0),
            currency: self.config.currency.clone(),
            adults: input.occupancy.adults as i32,
            children: input.occupancy.children as i32,
            child_ages: input.occupancy.child_ages.iter().map(|a| *a as i32).collect(),
            check_in: priced.travel_date,
            check_out: priced.travel_date + chrono::Duration::days(nights as i64),
            customer_name: input.customer_name,
            customer_email: input.customer_email,
            customer_phone: input.customer_phone,
            notes: input.notes,
            payment_reference: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: Some(now + self.config.hold_duration()),
            confirmed_at: None,
            paid_at: None,
            cancelled_at: None,
            reminder_sent_at: None,
            flights,
            hotels,
            transfers,
            excursions,
        };

        tx.insert_booking(&booking).await?;
        tx.commit().await?;

        info!(
            "🎫 Soft booking {} created: {} seats, total {} {}",
            booking.reservation_code, seats, booking.total_amount, booking.currency
        );
        self.record(&booking, AuditAction::Create, None, None, ctx).await;
        Ok(booking)
    }

    pub async fn confirm(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<Booking, BookingError> {
        self.expire_if_due(booking_id).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut booking = self.lock(tx.as_mut(), booking_id).await?;
        if booking.is_expired(now) {
            return Err(self.expired_under_lock(tx, booking, now, Transition::Confirm.verb()).await);
        }
        let next = next_status(&booking, Transition::Confirm)?;
        let before = booking.snapshot();

        booking.status = next;
        booking.confirmed_at = Some(now);
        booking.expires_at = None;
        booking.updated_at = now;

        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!("✅ Booking {} confirmed", booking.reservation_code);
        self.record(&booking, AuditAction::Confirm, Some(&before), None, ctx).await;
        self.notify(NotificationKind::Confirmation, &booking, None);
        Ok(booking)
    }

    pub async fn mark_paid(
        &self,
        booking_id: Uuid,
        ctx: &RequestContext,
        payment: PaymentMeta,
    ) -> Result<Booking, BookingError> {
        payment.validate()?;
        self.expire_if_due(booking_id).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut booking = self.lock(tx.as_mut(), booking_id).await?;
        if booking.is_expired(now) {
            return Err(self.expired_under_lock(tx, booking, now, Transition::MarkPaid.verb()).await);
        }
        let next = next_status(&booking, Transition::MarkPaid)?;

        if let Some(amount) = payment.amount {
            if amount != booking.total_amount {
                return Err(BookingError::Validation(format!(
                    "payment amount {} does not match booking total {}",
                    amount, booking.total_amount
                )));
            }
        }

        let before = booking.snapshot();
        booking.status = next;
        booking.paid_at = Some(now);
        booking.payment_reference = Some(payment.reference.clone());
        booking.updated_at = now;

        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!(
            "💳 Booking {} paid via {} ({})",
            booking.reservation_code, payment.provider, payment.reference
        );
        let notes = serde_json::to_string(&payment).ok();
        self.record(&booking, AuditAction::Payment, Some(&before), notes, ctx).await;
        self.notify(NotificationKind::PaymentReceived, &booking, None);
        Ok(booking)
    }

    /// User-initiated cancellation. Cancelling a CANCELLED or PAID booking is
    /// an `InvalidState` error, and so is cancelling a hold that has already
    /// run out: expiry gets there first.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        ctx: &RequestContext,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.expire_if_due(booking_id).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut booking = self.lock(tx.as_mut(), booking_id).await?;
        if booking.is_expired(now) {
            return Err(self.expired_under_lock(tx, booking, now, Transition::Cancel.verb()).await);
        }
        next_status(&booking, Transition::Cancel)?;
        let before = booking.snapshot();

        let released = self.release_and_cancel(tx.as_mut(), &mut booking, now, reason.clone()).await?;
        tx.commit().await?;

        self.after_cancel(&booking, &before, CancelOrigin::User, released, reason, ctx).await;
        Ok(booking)
    }

    /// Cancels a SOFT hold whose deadline has passed. Returns `None` when
    /// there was nothing to do (already cancelled, confirmed, or not yet due),
    /// so redundant sweeps are harmless.
    pub async fn expire_hold(
        &self,
        booking_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Option<Booking>, BookingError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let booking = self.lock(tx.as_mut(), booking_id).await?;
        if !booking.is_expired(now) {
            return Ok(None);
        }
        self.expire_locked(tx, booking, now, ctx).await.map(Some)
    }

    /// Cancels an overdue hold inside the transaction that locked it.
    async fn expire_locked(
        &self,
        mut tx: Box<dyn StoreTx>,
        mut booking: Booking,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<Booking, BookingError> {
        let before = booking.snapshot();
        let reason = Some(HOLD_EXPIRED.to_string());

        let released = self.release_and_cancel(tx.as_mut(), &mut booking, now, reason.clone()).await?;
        tx.commit().await?;

        self.after_cancel(&booking, &before, CancelOrigin::Expiry, released, reason, ctx).await;
        Ok(booking)
    }

    /// The deadline passed between the unlocked expiry check and the row
    /// lock. Expire the hold under that lock and refuse `action`.
    async fn expired_under_lock(
        &self,
        tx: Box<dyn StoreTx>,
        booking: Booking,
        now: DateTime<Utc>,
        action: &'static str,
    ) -> BookingError {
        match self.expire_locked(tx, booking, now, &RequestContext::system("expiry")).await {
            Ok(expired) => BookingError::InvalidState { status: expired.status, action },
            Err(e) => e,
        }
    }

    async fn release_and_cancel(
        &self,
        tx: &mut dyn StoreTx,
        booking: &mut Booking,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<i32, BookingError> {
        let mut released = 0;
        for line in booking.block_seat_lines() {
            if self.ledger.release(tx, line.leg_id, line.passengers).await?.is_tracked() {
                released += line.passengers;
            }
        }

        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(now);
        booking.expires_at = None;
        booking.cancellation_reason = reason;
        booking.updated_at = now;

        tx.update_booking(booking).await?;
        Ok(released)
    }

    async fn after_cancel(
        &self,
        booking: &Booking,
        before: &Value,
        origin: CancelOrigin,
        released: i32,
        reason: Option<String>,
        ctx: &RequestContext,
    ) {
        info!(
            "🗑️ Booking {} cancelled ({:?}), {} seats released",
            booking.reservation_code, origin, released
        );
        self.record(booking, AuditAction::Cancel, Some(before), reason.clone(), ctx).await;
        self.notify(NotificationKind::Cancellation, booking, reason);
    }

    /// Changes customer-facing fields. Never touches inventory, price or status.
    pub async fn modify(
        &self,
        booking_id: Uuid,
        ctx: &RequestContext,
        patch: BookingPatch,
    ) -> Result<Booking, BookingError> {
        patch.validate()?;
        self.expire_if_due(booking_id).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut booking = self.lock(tx.as_mut(), booking_id).await?;
        if booking.is_expired(now) {
            return Err(self.expired_under_lock(tx, booking, now, "modify").await);
        }
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidState { status: booking.status, action: "modify" });
        }

        let before = booking.snapshot();
        if !patch.apply_to(&mut booking) {
            return Err(BookingError::Validation("patch does not change anything".to_string()));
        }
        if booking.check_out <= booking.check_in {
            return Err(BookingError::Validation(format!(
                "check-out {} must be after check-in {}",
                booking.check_out, booking.check_in
            )));
        }
        booking.updated_at = now;

        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!("✏️ Booking {} modified", booking.reservation_code);
        self.record(&booking, AuditAction::Modify, Some(&before), None, ctx).await;
        self.notify(NotificationKind::Modification, &booking, None);
        Ok(booking)
    }

    /// Current state of a booking. An overdue hold is cancelled first, so a
    /// stale SOFT booking is never returned.
    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.expire_if_due(booking_id).await?;
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))
    }

    /// [`Self::get_booking`] plus a best-effort VIEW audit row.
    pub async fn view_booking(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id).await?;
        self.record_view(&booking, ctx).await;
        Ok(booking)
    }

    pub async fn booking_by_code(&self, code: &str, ctx: &RequestContext) -> Result<Booking, BookingError> {
        let found = self
            .store
            .booking_by_code(code)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", code)))?;
        self.view_booking(found.id, ctx).await
    }

    pub async fn audit_trail(&self, booking_id: Uuid) -> Result<Vec<AuditRecord>, BookingError> {
        if self.store.booking(booking_id).await?.is_none() {
            return Err(BookingError::booking_not_found(booking_id));
        }
        Ok(self.audit.trail(booking_id).await?)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn expire_if_due(&self, booking_id: Uuid) -> Result<(), BookingError> {
        let due = match self.store.booking(booking_id).await? {
            Some(booking) => booking.is_expired(self.clock.now()),
            None => return Err(BookingError::booking_not_found(booking_id)),
        };
        if due {
            self.expire_hold(booking_id, &RequestContext::system("expiry")).await?;
        }
        Ok(())
    }

    async fn lock(&self, tx: &mut dyn StoreTx, booking_id: Uuid) -> Result<Booking, BookingError> {
        tx.lock_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))
    }

    async fn record(
        &self,
        booking: &Booking,
        action: AuditAction,
        before: Option<&Value>,
        notes: Option<String>,
        ctx: &RequestContext,
    ) {
        let after = booking.snapshot();
        let recorded = self
            .audit
            .record(AuditEntry {
                booking_id: booking.id,
                action,
                before,
                after: Some(&after),
                notes,
                context: ctx,
            })
            .await;
        if recorded.is_none() {
            warn!("Booking {} {} is committed without an audit row", booking.reservation_code, action);
        }
    }

    async fn record_view(&self, booking: &Booking, ctx: &RequestContext) {
        self.audit
            .record(AuditEntry {
                booking_id: booking.id,
                action: AuditAction::View,
                before: None,
                after: None,
                notes: None,
                context: ctx,
            })
            .await;
    }

    fn notify(&self, kind: NotificationKind, booking: &Booking, reason: Option<String>) {
        let event = NotificationEvent::new(kind, booking.clone()).with_reason(reason);
        notification::dispatch(self.notifier.clone(), event);
    }
}

fn next_status(booking: &Booking, transition: Transition) -> Result<BookingStatus, BookingError> {
    booking.status.next(transition).ok_or(BookingError::InvalidState {
        status: booking.status,
        action: transition.verb(),
    })
}
