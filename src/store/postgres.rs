use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{AuditStore, BookingStore, ReferenceData, StoreError, StoreResult, StoreTx};
use crate::models::{
    AuditRecord, Booking, ExcursionBooking, FlightBooking, FlightLeg, HotelBooking, HotelRate,
    PackageConfig, TransferBooking,
};

const BOOKING_COLUMNS: &str = "id, reservation_code, status, package_id, total_amount, display_price, currency, \
     adults, children, child_ages, check_in, check_out, customer_name, customer_email, customer_phone, \
     notes, payment_reference, cancellation_reason, created_at, updated_at, expires_at, confirmed_at, \
     paid_at, cancelled_at, reminder_sent_at";

const LEG_COLUMNS: &str = "id, flight_number, origin, destination, departure_date, price_per_seat, \
     total_seats, available_seats, is_block_seat, block_group_id";

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    reservation_code: String,
    status: String,
    package_id: Option<Uuid>,
    total_amount: i64,
    display_price: i64,
    currency: String,
    adults: i32,
    children: i32,
    child_ages: Vec<i32>,
    check_in: NaiveDate,
    check_out: NaiveDate,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    notes: Option<String>,
    payment_reference: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    reminder_sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reservation_code: row.reservation_code,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            package_id: row.package_id,
            total_amount: row.total_amount,
            display_price: row.display_price,
            currency: row.currency,
            adults: row.adults,
            children: row.children,
            child_ages: row.child_ages,
            check_in: row.check_in,
            check_out: row.check_out,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            notes: row.notes,
            payment_reference: row.payment_reference,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            confirmed_at: row.confirmed_at,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
            reminder_sent_at: row.reminder_sent_at,
            flights: Vec::new(),
            hotels: Vec::new(),
            transfers: Vec::new(),
            excursions: Vec::new(),
        })
    }
}

#[derive(FromRow)]
struct FlightBookingRow {
    id: Uuid,
    booking_id: Uuid,
    leg_id: Uuid,
    passengers: i32,
    price_per_seat: i64,
    block_seat: bool,
}

#[derive(FromRow)]
struct HotelBookingRow {
    id: Uuid,
    booking_id: Uuid,
    hotel_id: Uuid,
    hotel_name: String,
    room_type: String,
    board: String,
    check_in: NaiveDate,
    nights: i32,
    price: i64,
}

#[derive(FromRow)]
struct TransferBookingRow {
    id: Uuid,
    booking_id: Uuid,
    description: String,
    passengers: i32,
    price: i64,
}

#[derive(FromRow)]
struct ExcursionBookingRow {
    id: Uuid,
    booking_id: Uuid,
    name: String,
    excursion_date: Option<NaiveDate>,
    participants: i32,
    price: i64,
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: Option<String>,
    action: String,
    previous_state: Option<serde_json::Value>,
    new_state: Option<serde_json::Value>,
    changes: serde_json::Value,
    notes: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    prev_hash: String,
    hash: String,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditRecord {
            id: row.id,
            booking_id: row.booking_id,
            user_id: row.user_id,
            action: row.action.parse().map_err(StoreError::Corrupt)?,
            previous_state: row.previous_state,
            new_state: row.new_state,
            changes: row.changes,
            notes: row.notes,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            prev_hash: row.prev_hash,
            hash: row.hash,
        })
    }
}

async fn load_line_items(conn: &mut PgConnection, booking: &mut Booking) -> StoreResult<()> {
    let flights: Vec<FlightBookingRow> = sqlx::query_as(
        "SELECT id, booking_id, leg_id, passengers, price_per_seat, block_seat
         FROM flight_bookings WHERE booking_id = $1 ORDER BY leg_id",
    )
    .bind(booking.id)
    .fetch_all(&mut *conn)
    .await?;

    let hotels: Vec<HotelBookingRow> = sqlx::query_as(
        "SELECT id, booking_id, hotel_id, hotel_name, room_type, board, check_in, nights, price
         FROM hotel_bookings WHERE booking_id = $1",
    )
    .bind(booking.id)
    .fetch_all(&mut *conn)
    .await?;

    let transfers: Vec<TransferBookingRow> = sqlx::query_as(
        "SELECT id, booking_id, description, passengers, price
         FROM transfer_bookings WHERE booking_id = $1",
    )
    .bind(booking.id)
    .fetch_all(&mut *conn)
    .await?;

    let excursions: Vec<ExcursionBookingRow> = sqlx::query_as(
        "SELECT id, booking_id, name, excursion_date, participants, price
         FROM excursion_bookings WHERE booking_id = $1",
    )
    .bind(booking.id)
    .fetch_all(&mut *conn)
    .await?;

    booking.flights = flights
        .into_iter()
        .map(|r| FlightBooking {
            id: r.id,
            booking_id: r.booking_id,
            leg_id: r.leg_id,
            passengers: r.passengers,
            price_per_seat: r.price_per_seat,
            block_seat: r.block_seat,
        })
        .collect();
    booking.hotels = hotels
        .into_iter()
        .map(|r| HotelBooking {
            id: r.id,
            booking_id: r.booking_id,
            hotel_id: r.hotel_id,
            hotel_name: r.hotel_name,
            room_type: r.room_type,
            board: r.board,
            check_in: r.check_in,
            nights: r.nights,
            price: r.price,
        })
        .collect();
    booking.transfers = transfers
        .into_iter()
        .map(|r| TransferBooking {
            id: r.id,
            booking_id: r.booking_id,
            description: r.description,
            passengers: r.passengers,
            price: r.price,
        })
        .collect();
    booking.excursions = excursions
        .into_iter()
        .map(|r| ExcursionBooking {
            id: r.id,
            booking_id: r.booking_id,
            name: r.name,
            excursion_date: r.excursion_date,
            participants: r.participants,
            price: r.price,
        })
        .collect();
    Ok(())
}

async fn fetch_booking(conn: &mut PgConnection, sql: &str, key: BookingKey<'_>) -> StoreResult<Option<Booking>> {
    let query = sqlx::query_as::<_, BookingRow>(sql);
    let query = match key {
        BookingKey::Id(id) => query.bind(id),
        BookingKey::Code(code) => query.bind(code.to_string()),
    };
    let Some(row) = query.fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let mut booking = Booking::try_from(row)?;
    load_line_items(conn, &mut booking).await?;
    Ok(Some(booking))
}

enum BookingKey<'a> {
    Id(Uuid),
    Code(&'a str),
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_leg(&mut self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>> {
        let sql = format!("SELECT {} FROM flight_legs WHERE id = $1 FOR UPDATE", LEG_COLUMNS);
        let leg = sqlx::query_as::<_, FlightLeg>(&sql)
            .bind(leg_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(leg)
    }

    async fn take_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>> {
        let remaining = sqlx::query_scalar::<_, i32>(
            "UPDATE flight_legs
             SET available_seats = available_seats - $2
             WHERE id = $1 AND is_block_seat AND available_seats >= $2
             RETURNING available_seats",
        )
        .bind(leg_id)
        .bind(seats)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(remaining)
    }

    async fn return_seats(&mut self, leg_id: Uuid, seats: i32) -> StoreResult<Option<i32>> {
        let available = sqlx::query_scalar::<_, i32>(
            "UPDATE flight_legs
             SET available_seats = LEAST(total_seats, available_seats + $2)
             WHERE id = $1 AND is_block_seat
             RETURNING available_seats",
        )
        .bind(leg_id)
        .bind(seats)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(available)
    }

    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
        fetch_booking(&mut self.tx, &sql, BookingKey::Id(booking_id)).await
    }

    async fn next_reservation_number(&mut self) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT nextval('reservation_code_seq')")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(n)
    }

    async fn insert_booking(&mut self, b: &Booking) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO bookings ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
            BOOKING_COLUMNS
        );
        sqlx::query(&sql)
            .bind(b.id)
            .bind(&b.reservation_code)
            .bind(b.status.as_str())
            .bind(b.package_id)
            .bind(b.total_amount)
            .bind(b.display_price)
            .bind(&b.currency)
            .bind(b.adults)
            .bind(b.children)
            .bind(&b.child_ages)
            .bind(b.check_in)
            .bind(b.check_out)
            .bind(&b.customer_name)
            .bind(&b.customer_email)
            .bind(&b.customer_phone)
            .bind(&b.notes)
            .bind(&b.payment_reference)
            .bind(&b.cancellation_reason)
            .bind(b.created_at)
            .bind(b.updated_at)
            .bind(b.expires_at)
            .bind(b.confirmed_at)
            .bind(b.paid_at)
            .bind(b.cancelled_at)
            .bind(b.reminder_sent_at)
            .execute(&mut *self.tx)
            .await?;

        for line in &b.flights {
            sqlx::query(
                "INSERT INTO flight_bookings (id, booking_id, leg_id, passengers, price_per_seat, block_seat)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(line.id)
            .bind(line.booking_id)
            .bind(line.leg_id)
            .bind(line.passengers)
            .bind(line.price_per_seat)
            .bind(line.block_seat)
            .execute(&mut *self.tx)
            .await?;
        }

        for line in &b.hotels {
            sqlx::query(
                "INSERT INTO hotel_bookings (id, booking_id, hotel_id, hotel_name, room_type, board, check_in, nights, price)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(line.id)
            .bind(line.booking_id)
            .bind(line.hotel_id)
            .bind(&line.hotel_name)
            .bind(&line.room_type)
            .bind(&line.board)
            .bind(line.check_in)
            .bind(line.nights)
            .bind(line.price)
            .execute(&mut *self.tx)
            .await?;
        }

        for line in &b.transfers {
            sqlx::query(
                "INSERT INTO transfer_bookings (id, booking_id, description, passengers, price)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(line.id)
            .bind(line.booking_id)
            .bind(&line.description)
            .bind(line.passengers)
            .bind(line.price)
            .execute(&mut *self.tx)
            .await?;
        }

        for line in &b.excursions {
            sqlx::query(
                "INSERT INTO excursion_bookings (id, booking_id, name, excursion_date, participants, price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(line.id)
            .bind(line.booking_id)
            .bind(&line.name)
            .bind(line.excursion_date)
            .bind(line.participants)
            .bind(line.price)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_booking(&mut self, b: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET
                status = $2, customer_name = $3, customer_email = $4, customer_phone = $5,
                notes = $6, check_in = $7, check_out = $8, payment_reference = $9,
                cancellation_reason = $10, updated_at = $11, expires_at = $12,
                confirmed_at = $13, paid_at = $14, cancelled_at = $15, reminder_sent_at = $16
             WHERE id = $1",
        )
        .bind(b.id)
        .bind(b.status.as_str())
        .bind(&b.customer_name)
        .bind(&b.customer_email)
        .bind(&b.customer_phone)
        .bind(&b.notes)
        .bind(b.check_in)
        .bind(b.check_out)
        .bind(&b.payment_reference)
        .bind(&b.cancellation_reason)
        .bind(b.updated_at)
        .bind(b.expires_at)
        .bind(b.confirmed_at)
        .bind(b.paid_at)
        .bind(b.cancelled_at)
        .bind(b.reminder_sent_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("booking {} vanished mid-transaction", b.id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        fetch_booking(&mut conn, &sql, BookingKey::Id(booking_id)).await
    }

    async fn booking_by_code(&self, code: &str) -> StoreResult<Option<Booking>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM bookings WHERE reservation_code = $1", BOOKING_COLUMNS);
        fetch_booking(&mut conn, &sql, BookingKey::Code(code)).await
    }

    async fn expired_soft_bookings(
        &self,
        now: DateTime<Utc>,
        after: Option<Uuid>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM bookings
             WHERE status = 'SOFT' AND expires_at <= $1 AND ($2::uuid IS NULL OR id > $2)
             ORDER BY id
             LIMIT $3",
        )
        .bind(now)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn bookings_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings
             WHERE status = 'SOFT' AND reminder_sent_at IS NULL AND expires_at > $1 AND expires_at <= $2
             ORDER BY expires_at
             LIMIT $3",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(now)
            .bind(until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            let mut booking = Booking::try_from(row)?;
            load_line_items(&mut conn, &mut booking).await?;
            bookings.push(booking);
        }
        Ok(bookings)
    }

    async fn mark_reminder_sent(&self, booking_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET reminder_sent_at = $2
             WHERE id = $1 AND status = 'SOFT' AND reminder_sent_at IS NULL",
        )
        .bind(booking_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReferenceData for PgStore {
    async fn flight_leg(&self, leg_id: Uuid) -> StoreResult<Option<FlightLeg>> {
        let sql = format!("SELECT {} FROM flight_legs WHERE id = $1", LEG_COLUMNS);
        let leg = sqlx::query_as::<_, FlightLeg>(&sql)
            .bind(leg_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(leg)
    }

    async fn package(&self, package_id: Uuid) -> StoreResult<Option<PackageConfig>> {
        let package = sqlx::query_as::<_, PackageConfig>(
            "SELECT id, name, hotel_id, hotel_name, room_type, outbound_leg_id, return_leg_id, nights,
                    transfer_included, transfer_price, service_charge, profit_margin_percent, revision
             FROM packages WHERE id = $1",
        )
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(package)
    }

    async fn hotel_rates(&self, hotel_id: Uuid, room_type: &str) -> StoreResult<Vec<HotelRate>> {
        let rates = sqlx::query_as::<_, HotelRate>(
            "SELECT id, hotel_id, room_type, board, from_date, till_date, single, double, extra_bed,
                    paying_kids_age, payment_kids
             FROM hotel_rates
             WHERE hotel_id = $1 AND room_type = $2
             ORDER BY from_date, id",
        )
        .bind(hotel_id)
        .bind(room_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rates)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, r: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO booking_audits
                (id, booking_id, user_id, action, previous_state, new_state, changes, notes,
                 ip_address, user_agent, created_at, prev_hash, hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(r.id)
        .bind(r.booking_id)
        .bind(&r.user_id)
        .bind(r.action.as_str())
        .bind(&r.previous_state)
        .bind(&r.new_state)
        .bind(&r.changes)
        .bind(&r.notes)
        .bind(&r.ip_address)
        .bind(&r.user_agent)
        .bind(r.created_at)
        .bind(&r.prev_hash)
        .bind(&r.hash)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(format!(
                "booking {} already has a successor to {:?}",
                r.booking_id, r.prev_hash
            )),
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn latest_audit_hash(&self, booking_id: Uuid) -> StoreResult<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT hash FROM booking_audits WHERE booking_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn audit_trail(&self, booking_id: Uuid) -> StoreResult<Vec<AuditRecord>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, booking_id, user_id, action, previous_state, new_state, changes, notes,
                    ip_address, user_agent, created_at, prev_hash, hash
             FROM booking_audits WHERE booking_id = $1 ORDER BY seq",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRecord::try_from).collect()
    }
}
