use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Soft,
    Confirmed,
    Paid,
    Cancelled,
}

/// The three lifecycle moves that change status. `modify` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    MarkPaid,
    Cancel,
}

impl Transition {
    pub fn verb(self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::MarkPaid => "mark as paid",
            Transition::Cancel => "cancel",
        }
    }
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Soft => "SOFT",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Transition table. `None` means the move is illegal from this status.
    pub fn next(self, transition: Transition) -> Option<BookingStatus> {
        use BookingStatus::*;
        match (self, transition) {
            (Soft, Transition::Confirm) => Some(Confirmed),
            (Confirmed, Transition::MarkPaid) => Some(Paid),
            (Soft | Confirmed, Transition::Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOFT" => Ok(BookingStatus::Soft),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "PAID" => Ok(BookingStatus::Paid),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// Adults, children and (optionally) the children's ages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupancy {
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub child_ages: Vec<u32>,
}

impl Occupancy {
    pub fn new(adults: u32, children: u32, child_ages: Vec<u32>) -> Self {
        Self { adults, children, child_ages }
    }

    pub fn adults(adults: u32) -> Self {
        Self::new(adults, 0, Vec::new())
    }

    pub fn has_ages(&self) -> bool {
        !self.child_ages.is_empty()
    }

    /// Seats consumed on each block-seat leg. Infants (age <= 1) fly on a lap.
    pub fn seats_required(&self) -> u32 {
        if self.has_ages() {
            self.adults + self.child_ages.iter().filter(|age| **age >= 2).count() as u32
        } else {
            self.adults + self.children
        }
    }

    pub fn check(&self) -> Result<(), String> {
        if self.has_ages() && self.child_ages.len() != self.children as usize {
            return Err(format!(
                "{} child ages given for {} children",
                self.child_ages.len(),
                self.children
            ));
        }
        if self.child_ages.iter().any(|age| *age > 17) {
            return Err("child ages must be between 0 and 17".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub leg_id: Uuid,
    pub passengers: i32,
    pub price_per_seat: i64,
    /// Whether seats were actually taken from the leg's block inventory.
    pub block_seat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub hotel_id: Uuid,
    pub hotel_name: String,
    pub room_type: String,
    pub board: String,
    pub check_in: NaiveDate,
    pub nights: i32,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub description: String,
    pub passengers: i32,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcursionBooking {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub name: String,
    pub excursion_date: Option<NaiveDate>,
    pub participants: i32,
    pub price: i64,
}

/// One customer reservation with its line items. Amounts are minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reservation_code: String,
    pub status: BookingStatus,
    pub package_id: Option<Uuid>,
    pub total_amount: i64,
    /// Customer-facing rounded price in major units.
    pub display_price: i64,
    pub currency: String,
    pub adults: i32,
    pub children: i32,
    pub child_ages: Vec<i32>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub flights: Vec<FlightBooking>,
    pub hotels: Vec<HotelBooking>,
    pub transfers: Vec<TransferBooking>,
    pub excursions: Vec<ExcursionBooking>,
}

impl Booking {
    /// A soft hold whose deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Soft && self.expires_at.is_some_and(|at| at <= now)
    }

    /// `expires_at` is set exactly while the booking is SOFT.
    pub fn expiry_consistent(&self) -> bool {
        (self.status == BookingStatus::Soft) == self.expires_at.is_some()
    }

    pub fn block_seat_lines(&self) -> impl Iterator<Item = &FlightBooking> {
        self.flights.iter().filter(|line| line.block_seat)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExcursionRequest {
    #[validate(length(min = 1, message = "excursion name is required"))]
    pub name: String,
    pub date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "excursion price cannot be negative"))]
    pub price_per_person: i64,
    #[validate(range(min = 1, message = "at least one participant is required"))]
    pub participants: i32,
}

/// Input to `create_soft_booking`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBooking {
    pub package_id: Uuid,
    #[serde(flatten)]
    pub occupancy: Occupancy,
    #[validate(length(min = 1, message = "customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "customer email is invalid"))]
    pub customer_email: String,
    #[validate(length(min = 5, message = "customer phone is required"))]
    pub customer_phone: String,
    pub notes: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub excursions: Vec<ExcursionRequest>,
}

/// Customer-facing fields `modify` may change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BookingPatch {
    #[validate(length(min = 1, message = "customer name cannot be empty"))]
    pub customer_name: Option<String>,
    #[validate(email(message = "customer email is invalid"))]
    pub customer_email: Option<String>,
    #[validate(length(min = 5, message = "customer phone is too short"))]
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
}

impl BookingPatch {
    /// Applies the patch and reports whether anything changed.
    pub fn apply_to(&self, booking: &mut Booking) -> bool {
        let mut changed = false;
        changed |= set_if_changed(&mut booking.customer_name, &self.customer_name);
        changed |= set_if_changed(&mut booking.customer_email, &self.customer_email);
        changed |= set_if_changed(&mut booking.customer_phone, &self.customer_phone);
        changed |= set_if_changed(&mut booking.check_in, &self.check_in);
        changed |= set_if_changed(&mut booking.check_out, &self.check_out);
        if let Some(notes) = &self.notes {
            if booking.notes.as_ref() != Some(notes) {
                booking.notes = Some(notes.clone());
                changed = true;
            }
        }
        changed
    }
}

fn set_if_changed<T: PartialEq + Clone>(field: &mut T, value: &Option<T>) -> bool {
    match value {
        Some(v) if field != v => {
            *field = v.clone();
            true
        }
        _ => false,
    }
}

/// Externally verified payment confirmation passed to `mark_paid`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentMeta {
    #[validate(length(min = 1, message = "payment provider is required"))]
    pub provider: String,
    #[validate(length(min = 1, message = "payment reference is required"))]
    pub reference: String,
    pub amount: Option<i64>,
}
