use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gondola_core::repository::{
    AdminRepository, BookingRepository, FlightRepository, MeisterRepository, PassengerRepository, PilotRepository,
    SessionRepository, SettingsRepository,
};
use gondola_core::{
    Admin, Booking, BookingStatus, CoreError, CoreResult, Flight, FlightChanges, FlightLoad, FlightStatus, Meister,
    NewBooking, NewFlight, NewMeister, NewPassenger, NewPilot, Passenger, Pilot, PilotProfileUpdate,
    PlatformSettings, Role, Session,
};
use gondola_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed implementation of every repository.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> CoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return CoreError::Conflict(db.message().to_string());
        }
    }
    CoreError::InternalError(e.to_string())
}

// Row structs for type-safe querying

#[derive(sqlx::FromRow)]
struct PilotRow {
    id: Uuid,
    name: String,
    email: String,
    phone: String,
    password_hash: String,
    license_number: String,
    balloon_registration: Option<String>,
    payout_account_id: Option<String>,
    approved: bool,
    blocked: bool,
    created_at: DateTime<Utc>,
}

impl From<PilotRow> for Pilot {
    fn from(row: PilotRow) -> Self {
        Pilot {
            id: row.id,
            name: row.name,
            email: Masked(row.email),
            phone: Masked(row.phone),
            password_hash: row.password_hash,
            license_number: row.license_number,
            balloon_registration: row.balloon_registration,
            payout_account_id: row.payout_account_id,
            approved: row.approved,
            blocked: row.blocked,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    name: String,
    email: String,
    phone: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Passenger {
            id: row.id,
            name: row.name,
            email: Masked(row.email),
            phone: Masked(row.phone),
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MeisterRow {
    id: Uuid,
    name: String,
    email: String,
    phone: String,
    organization: String,
    password_hash: String,
    approved: bool,
    created_at: DateTime<Utc>,
}

impl From<MeisterRow> for Meister {
    fn from(row: MeisterRow) -> Self {
        Meister {
            id: row.id,
            name: row.name,
            email: Masked(row.email),
            phone: Masked(row.phone),
            organization: row.organization,
            password_hash: row.password_hash,
            approved: row.approved,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: Uuid,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<AdminRow> for Admin {
    fn from(row: AdminRow) -> Self {
        Admin {
            id: row.id,
            email: Masked(row.email),
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    token_hash: String,
    account_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = CoreError;

    fn try_from(row: SessionRow) -> CoreResult<Self> {
        Ok(Session {
            id: row.id,
            token_hash: row.token_hash,
            account_id: row.account_id,
            role: row.role.parse::<Role>()?,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    pilot_id: Uuid,
    title: String,
    description: Option<String>,
    launch_site: String,
    departure_time: DateTime<Utc>,
    duration_minutes: i32,
    price_cents: i64,
    currency: String,
    max_passengers: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = CoreError;

    fn try_from(row: FlightRow) -> CoreResult<Self> {
        Ok(Flight {
            id: row.id,
            pilot_id: row.pilot_id,
            title: row.title,
            description: row.description,
            launch_site: row.launch_site,
            departure_time: row.departure_time,
            duration_minutes: row.duration_minutes,
            price_cents: row.price_cents,
            currency: row.currency,
            max_passengers: row.max_passengers,
            status: row.status.parse::<FlightStatus>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FlightLoadRow {
    #[sqlx(flatten)]
    flight: FlightRow,
    booked_seats: i64,
}

impl TryFrom<FlightLoadRow> for FlightLoad {
    type Error = CoreError;

    fn try_from(row: FlightLoadRow) -> CoreResult<Self> {
        Ok(FlightLoad {
            flight: row.flight.try_into()?,
            booked_seats: row.booked_seats,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    flight_id: Uuid,
    passenger_id: Uuid,
    status: String,
    paid: bool,
    amount_cents: i64,
    platform_fee_cents: i64,
    pilot_payout_cents: i64,
    currency: String,
    checkout_session_id: Option<String>,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    canceled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> CoreResult<Self> {
        Ok(Booking {
            id: row.id,
            flight_id: row.flight_id,
            passenger_id: row.passenger_id,
            status: row.status.parse::<BookingStatus>()?,
            paid: row.paid,
            amount_cents: row.amount_cents,
            platform_fee_cents: row.platform_fee_cents,
            pilot_payout_cents: row.pilot_payout_cents,
            currency: row.currency,
            checkout_session_id: row.checkout_session_id,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
            canceled_at: row.canceled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PilotBookingRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    pilot_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    fee_bps: i32,
    updated_at: DateTime<Utc>,
}

fn bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn loads(rows: Vec<FlightLoadRow>) -> CoreResult<Vec<FlightLoad>> {
    rows.into_iter().map(FlightLoad::try_from).collect()
}

const PILOT_COLUMNS: &str = "id, name, email, phone, password_hash, license_number, balloon_registration, \
     payout_account_id, approved, blocked, created_at";

const FLIGHT_COLUMNS: &str = "f.id, f.pilot_id, f.title, f.description, f.launch_site, f.departure_time, \
     f.duration_minutes, f.price_cents, f.currency, f.max_passengers, f.status, f.created_at, f.updated_at";

const BOOKING_COLUMNS: &str = "b.id, b.flight_id, b.passenger_id, b.status, b.paid, b.amount_cents, \
     b.platform_fee_cents, b.pilot_payout_cents, b.currency, b.checkout_session_id, b.payment_reference, \
     b.created_at, b.updated_at, b.canceled_at";

fn flight_load_query(filter: &str) -> String {
    format!(
        "SELECT {FLIGHT_COLUMNS}, \
         (SELECT COUNT(*) FROM bookings b WHERE b.flight_id = f.id AND b.status <> 'canceled') AS booked_seats \
         FROM flights f {filter}"
    )
}

#[async_trait]
impl PilotRepository for PgStore {
    async fn create_pilot(&self, pilot: &NewPilot) -> CoreResult<Pilot> {
        let row = sqlx::query_as::<_, PilotRow>(&format!(
            "INSERT INTO pilots (id, name, email, phone, password_hash, license_number, balloon_registration) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PILOT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&pilot.name)
        .bind(&pilot.email)
        .bind(&pilot.phone)
        .bind(&pilot.password_hash)
        .bind(&pilot.license_number)
        .bind(&pilot.balloon_registration)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn get_pilot(&self, id: Uuid) -> CoreResult<Option<Pilot>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!("SELECT {PILOT_COLUMNS} FROM pilots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Pilot::from))
    }

    async fn find_pilot_by_email(&self, email: &str) -> CoreResult<Option<Pilot>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!(
            "SELECT {PILOT_COLUMNS} FROM pilots WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Pilot::from))
    }

    async fn list_pilots(&self) -> CoreResult<Vec<Pilot>> {
        let rows = sqlx::query_as::<_, PilotRow>(&format!("SELECT {PILOT_COLUMNS} FROM pilots ORDER BY created_at"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Pilot::from).collect())
    }

    async fn update_pilot_profile(&self, id: Uuid, update: &PilotProfileUpdate) -> CoreResult<Option<Pilot>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!(
            "UPDATE pilots SET \
                phone = COALESCE($2, phone), \
                license_number = COALESCE($3, license_number), \
                balloon_registration = COALESCE($4, balloon_registration), \
                payout_account_id = COALESCE($5, payout_account_id) \
             WHERE id = $1 RETURNING {PILOT_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.phone)
        .bind(&update.license_number)
        .bind(&update.balloon_registration)
        .bind(&update.payout_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Pilot::from))
    }

    async fn set_pilot_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Pilot>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!(
            "UPDATE pilots SET approved = $2 WHERE id = $1 RETURNING {PILOT_COLUMNS}"
        ))
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Pilot::from))
    }

    async fn set_pilot_blocked(&self, id: Uuid, blocked: bool) -> CoreResult<Option<Pilot>> {
        let row = sqlx::query_as::<_, PilotRow>(&format!(
            "UPDATE pilots SET blocked = $2 WHERE id = $1 RETURNING {PILOT_COLUMNS}"
        ))
        .bind(id)
        .bind(blocked)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Pilot::from))
    }
}

#[async_trait]
impl PassengerRepository for PgStore {
    async fn create_passenger(&self, passenger: &NewPassenger) -> CoreResult<Passenger> {
        let row = sqlx::query_as::<_, PassengerRow>(
            "INSERT INTO passengers (id, name, email, phone, password_hash) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, email, phone, password_hash, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&passenger.name)
        .bind(&passenger.email)
        .bind(&passenger.phone)
        .bind(&passenger.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn get_passenger(&self, id: Uuid) -> CoreResult<Option<Passenger>> {
        let row = sqlx::query_as::<_, PassengerRow>(
            "SELECT id, name, email, phone, password_hash, created_at FROM passengers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Passenger::from))
    }

    async fn find_passenger_by_email(&self, email: &str) -> CoreResult<Option<Passenger>> {
        let row = sqlx::query_as::<_, PassengerRow>(
            "SELECT id, name, email, phone, password_hash, created_at FROM passengers WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Passenger::from))
    }
}

const MEISTER_COLUMNS: &str = "id, name, email, phone, organization, password_hash, approved, created_at";

#[async_trait]
impl MeisterRepository for PgStore {
    async fn create_meister(&self, meister: &NewMeister) -> CoreResult<Meister> {
        let row = sqlx::query_as::<_, MeisterRow>(&format!(
            "INSERT INTO meisters (id, name, email, phone, organization, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MEISTER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&meister.name)
        .bind(&meister.email)
        .bind(&meister.phone)
        .bind(&meister.organization)
        .bind(&meister.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn get_meister(&self, id: Uuid) -> CoreResult<Option<Meister>> {
        let row = sqlx::query_as::<_, MeisterRow>(&format!("SELECT {MEISTER_COLUMNS} FROM meisters WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Meister::from))
    }

    async fn find_meister_by_email(&self, email: &str) -> CoreResult<Option<Meister>> {
        let row = sqlx::query_as::<_, MeisterRow>(&format!(
            "SELECT {MEISTER_COLUMNS} FROM meisters WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Meister::from))
    }

    async fn list_meisters(&self) -> CoreResult<Vec<Meister>> {
        let rows = sqlx::query_as::<_, MeisterRow>(&format!(
            "SELECT {MEISTER_COLUMNS} FROM meisters ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Meister::from).collect())
    }

    async fn set_meister_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Meister>> {
        let row = sqlx::query_as::<_, MeisterRow>(&format!(
            "UPDATE meisters SET approved = $2 WHERE id = $1 RETURNING {MEISTER_COLUMNS}"
        ))
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Meister::from))
    }
}

#[async_trait]
impl AdminRepository for PgStore {
    async fn create_admin(&self, email: &str, password_hash: &str) -> CoreResult<Admin> {
        let row = sqlx::query_as::<_, AdminRow>(
            "INSERT INTO admins (id, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, email, password_hash, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn get_admin(&self, id: Uuid) -> CoreResult<Option<Admin>> {
        let row = sqlx::query_as::<_, AdminRow>("SELECT id, email, password_hash, created_at FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(Admin::from))
    }

    async fn find_admin_by_email(&self, email: &str) -> CoreResult<Option<Admin>> {
        let row = sqlx::query_as::<_, AdminRow>(
            "SELECT id, email, password_hash, created_at FROM admins WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Admin::from))
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn create_session(&self, session: &Session) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, token_hash, account_id, role, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session.id)
        .bind(&session.token_hash)
        .bind(session.account_id)
        .bind(session.role.as_str())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_session(&self, token_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, token_hash, account_id, role, created_at, expires_at FROM sessions \
             WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Session::try_from).transpose()
    }

    async fn delete_session(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_sessions_for_account(&self, account_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FlightRepository for PgStore {
    async fn create_flight(&self, flight: &NewFlight) -> CoreResult<Flight> {
        let row = sqlx::query_as::<_, FlightRow>(
            "INSERT INTO flights (id, pilot_id, title, description, launch_site, departure_time, \
                duration_minutes, price_cents, currency, max_passengers) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id, pilot_id, title, description, launch_site, departure_time, duration_minutes, \
                price_cents, currency, max_passengers, status, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(flight.pilot_id)
        .bind(&flight.title)
        .bind(&flight.description)
        .bind(&flight.launch_site)
        .bind(flight.departure_time)
        .bind(flight.duration_minutes)
        .bind(flight.price_cents)
        .bind(&flight.currency)
        .bind(flight.max_passengers)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        row.try_into()
    }

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightLoad>> {
        let row = sqlx::query_as::<_, FlightLoadRow>(&flight_load_query("WHERE f.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(FlightLoad::try_from).transpose()
    }

    async fn list_upcoming_flights(&self, now: DateTime<Utc>) -> CoreResult<Vec<FlightLoad>> {
        let rows = sqlx::query_as::<_, FlightLoadRow>(&flight_load_query(
            "WHERE f.status = 'scheduled' AND f.departure_time > $1 ORDER BY f.departure_time",
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        loads(rows)
    }

    async fn list_flights_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<FlightLoad>> {
        let rows = sqlx::query_as::<_, FlightLoadRow>(&flight_load_query(
            "WHERE f.pilot_id = $1 ORDER BY f.departure_time",
        ))
        .bind(pilot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        loads(rows)
    }

    async fn update_flight(&self, id: Uuid, changes: &FlightChanges) -> CoreResult<Option<Flight>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Lock the flight row so no reservation slips in between count and write
        let current = sqlx::query_as::<_, FlightRow>(
            "SELECT id, pilot_id, title, description, launch_site, departure_time, duration_minutes, \
                price_cents, currency, max_passengers, status, created_at, updated_at \
             FROM flights WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;
        let Some(current) = current else {
            return Ok(None);
        };
        let mut flight = Flight::try_from(current)?;
        if flight.status == FlightStatus::Canceled {
            return Err(CoreError::Conflict(format!("flight {} is canceled", id)));
        }

        if let Some(max) = changes.max_passengers {
            let (booked,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE flight_id = $1 AND status <> 'canceled'")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error)?;
            if i64::from(max) < booked {
                return Err(CoreError::Conflict(format!(
                    "flight {} already has {} live bookings, cannot reduce capacity to {}",
                    id, booked, max
                )));
            }
        }

        changes.apply(&mut flight);
        sqlx::query(
            "UPDATE flights SET title = $2, description = $3, launch_site = $4, departure_time = $5, \
                duration_minutes = $6, price_cents = $7, max_passengers = $8, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&flight.title)
        .bind(&flight.description)
        .bind(&flight.launch_site)
        .bind(flight.departure_time)
        .bind(flight.duration_minutes)
        .bind(flight.price_cents)
        .bind(flight.max_passengers)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        flight.updated_at = Utc::now();
        Ok(Some(flight))
    }

    async fn set_flight_status(&self, id: Uuid, status: FlightStatus) -> CoreResult<Option<Flight>> {
        let row = sqlx::query_as::<_, FlightRow>(
            "UPDATE flights SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING id, pilot_id, title, description, launch_site, departure_time, duration_minutes, \
                price_cents, currency, max_passengers, status, created_at, updated_at",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Flight::try_from).transpose()
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn reserve_booking(&self, booking: &NewBooking) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Serializes reservations per flight
        let flight: Option<(String, i32)> =
            sqlx::query_as("SELECT status, max_passengers FROM flights WHERE id = $1 FOR UPDATE")
                .bind(booking.flight_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let (status, max_passengers) =
            flight.ok_or_else(|| CoreError::NotFound(format!("flight {}", booking.flight_id)))?;
        if status.parse::<FlightStatus>()? != FlightStatus::Scheduled {
            return Err(CoreError::Conflict(format!("flight {} is canceled", booking.flight_id)));
        }

        let (booked, already_booked): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(BOOL_OR(passenger_id = $2), FALSE) \
             FROM bookings WHERE flight_id = $1 AND status <> 'canceled'",
        )
        .bind(booking.flight_id)
        .bind(booking.passenger_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        if already_booked {
            return Err(CoreError::Conflict(format!(
                "passenger already holds a booking on flight {}",
                booking.flight_id
            )));
        }
        if booked >= i64::from(max_passengers) {
            return Err(CoreError::CapacityExceeded {
                flight_id: booking.flight_id,
                max_passengers,
            });
        }

        let record = booking.clone().into_pending(Utc::now());
        sqlx::query(
            "INSERT INTO bookings (id, flight_id, passenger_id, status, paid, amount_cents, platform_fee_cents, \
                pilot_payout_cents, currency, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(record.flight_id)
        .bind(record.passenger_id)
        .bind(record.status.as_str())
        .bind(record.paid)
        .bind(record.amount_cents)
        .bind(record.platform_fee_cents)
        .bind(record.pilot_payout_cents)
        .bind(&record.currency)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(record)
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_booking_by_checkout(&self, session_id: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.checkout_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.passenger_id = $1 ORDER BY b.created_at"
        ))
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        bookings(rows)
    }

    async fn list_bookings_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b JOIN flights f ON f.id = b.flight_id \
             WHERE f.pilot_id = $1 ORDER BY b.created_at"
        ))
        .bind(pilot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        bookings(rows)
    }

    async fn list_bookings_by_flight(&self, flight_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.flight_id = $1 ORDER BY b.created_at"
        ))
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        bookings(rows)
    }

    async fn list_all_bookings(&self) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b ORDER BY b.created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        bookings(rows)
    }

    async fn list_bookings_with_pilot(&self) -> CoreResult<Vec<(Uuid, Booking)>> {
        let rows = sqlx::query_as::<_, PilotBookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS}, f.pilot_id FROM bookings b JOIN flights f ON f.id = b.flight_id \
             ORDER BY b.created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter()
            .map(|row| Ok((row.pilot_id, Booking::try_from(row.booking)?)))
            .collect()
    }

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings b SET checkout_session_id = $2, updated_at = NOW() WHERE b.id = $1 \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        payment_reference: Option<&str>,
    ) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings b SET \
                status = $3, \
                paid = b.paid OR $3 = 'confirmed', \
                payment_reference = COALESCE($4, b.payment_reference), \
                canceled_at = CASE WHEN $3 = 'canceled' THEN NOW() ELSE b.canceled_at END, \
                updated_at = NOW() \
             WHERE b.id = $1 AND b.status = $2 \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn record_late_payment(&self, id: Uuid, payment_reference: Option<&str>) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings b SET \
                paid = TRUE, \
                payment_reference = COALESCE($2, b.payment_reference), \
                updated_at = NOW() \
             WHERE b.id = $1 AND b.status = 'canceled' AND NOT b.paid \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_stale_pending_bookings(&self, created_before: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b \
             WHERE b.status = 'pending' AND b.created_at < $1 ORDER BY b.created_at"
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        bookings(rows)
    }
}

#[async_trait]
impl SettingsRepository for PgStore {
    async fn get_settings(&self) -> CoreResult<Option<PlatformSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>("SELECT fee_bps, updated_at FROM platform_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(|r| {
            let fee_bps = u32::try_from(r.fee_bps)
                .map_err(|_| CoreError::InternalError(format!("stored fee_bps {} is negative", r.fee_bps)))?;
            Ok(PlatformSettings {
                fee_bps,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }

    async fn save_settings(&self, settings: &PlatformSettings) -> CoreResult<PlatformSettings> {
        let fee_bps = i32::try_from(settings.fee_bps)
            .map_err(|_| CoreError::ValidationError(format!("fee_bps {} out of range", settings.fee_bps)))?;
        let row = sqlx::query_as::<_, SettingsRow>(
            "INSERT INTO platform_settings (id, fee_bps, updated_at) VALUES (1, $1, NOW()) \
             ON CONFLICT (id) DO UPDATE SET fee_bps = EXCLUDED.fee_bps, updated_at = EXCLUDED.updated_at \
             RETURNING fee_bps, updated_at",
        )
        .bind(fee_bps)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(PlatformSettings {
            fee_bps: settings.fee_bps,
            updated_at: row.updated_at,
        })
    }
}
