use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, NewBooking};
use crate::flight::{Flight, FlightChanges, FlightLoad, FlightStatus, NewFlight};
use crate::identity::{
    Admin, Meister, NewMeister, NewPassenger, NewPilot, Passenger, Pilot, PilotProfileUpdate, Session,
};
use crate::settings::PlatformSettings;
use crate::CoreResult;

/// Repository trait for pilot accounts
#[async_trait]
pub trait PilotRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_pilot(&self, pilot: &NewPilot) -> CoreResult<Pilot>;

    async fn get_pilot(&self, id: Uuid) -> CoreResult<Option<Pilot>>;

    async fn find_pilot_by_email(&self, email: &str) -> CoreResult<Option<Pilot>>;

    async fn list_pilots(&self) -> CoreResult<Vec<Pilot>>;

    async fn update_pilot_profile(&self, id: Uuid, update: &PilotProfileUpdate) -> CoreResult<Option<Pilot>>;

    async fn set_pilot_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Pilot>>;

    async fn set_pilot_blocked(&self, id: Uuid, blocked: bool) -> CoreResult<Option<Pilot>>;
}

/// Repository trait for passenger accounts
#[async_trait]
pub trait PassengerRepository: Send + Sync {
    async fn create_passenger(&self, passenger: &NewPassenger) -> CoreResult<Passenger>;

    async fn get_passenger(&self, id: Uuid) -> CoreResult<Option<Passenger>>;

    async fn find_passenger_by_email(&self, email: &str) -> CoreResult<Option<Passenger>>;
}

/// Repository trait for festival organizer accounts
#[async_trait]
pub trait MeisterRepository: Send + Sync {
    async fn create_meister(&self, meister: &NewMeister) -> CoreResult<Meister>;

    async fn get_meister(&self, id: Uuid) -> CoreResult<Option<Meister>>;

    async fn find_meister_by_email(&self, email: &str) -> CoreResult<Option<Meister>>;

    async fn list_meisters(&self) -> CoreResult<Vec<Meister>>;

    async fn set_meister_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Meister>>;
}

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn create_admin(&self, email: &str, password_hash: &str) -> CoreResult<Admin>;

    async fn get_admin(&self, id: Uuid) -> CoreResult<Option<Admin>>;

    async fn find_admin_by_email(&self, email: &str) -> CoreResult<Option<Admin>>;
}

/// Repository trait for login sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &Session) -> CoreResult<()>;

    /// Only returns sessions that are still valid at `now`.
    async fn find_session(&self, token_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<Session>>;

    async fn delete_session(&self, id: Uuid) -> CoreResult<()>;

    async fn delete_sessions_for_account(&self, account_id: Uuid) -> CoreResult<u64>;

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> CoreResult<u64>;
}

/// Repository trait for flight data access
#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn create_flight(&self, flight: &NewFlight) -> CoreResult<Flight>;

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightLoad>>;

    /// Scheduled flights departing after `now`, earliest first.
    async fn list_upcoming_flights(&self, now: DateTime<Utc>) -> CoreResult<Vec<FlightLoad>>;

    async fn list_flights_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<FlightLoad>>;

    /// Fails with `Conflict` when `max_passengers` would drop below the live
    /// booking count; the check and the write are atomic.
    async fn update_flight(&self, id: Uuid, changes: &FlightChanges) -> CoreResult<Option<Flight>>;

    async fn set_flight_status(&self, id: Uuid, status: FlightStatus) -> CoreResult<Option<Flight>>;
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts a pending booking if the flight exists, is scheduled, has a free
    /// seat and the passenger holds no live booking on it. The capacity check
    /// and the insert are atomic.
    async fn reserve_booking(&self, booking: &NewBooking) -> CoreResult<Booking>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn find_booking_by_checkout(&self, session_id: &str) -> CoreResult<Option<Booking>>;

    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn list_bookings_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn list_bookings_by_flight(&self, flight_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn list_all_bookings(&self) -> CoreResult<Vec<Booking>>;

    /// Every booking paired with the pilot who flies it.
    async fn list_bookings_with_pilot(&self) -> CoreResult<Vec<(Uuid, Booking)>>;

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> CoreResult<Option<Booking>>;

    /// Conditional status update: applies only while the booking is still in
    /// `from`. Returns `None` when the booking is missing or moved on.
    async fn transition_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        payment_reference: Option<&str>,
    ) -> CoreResult<Option<Booking>>;

    /// Marks a canceled, unpaid booking as paid when money arrived after the
    /// cancellation. Returns `None` when the booking is missing, not canceled
    /// or already marked paid, so at most one caller wins.
    async fn record_late_payment(&self, id: Uuid, payment_reference: Option<&str>) -> CoreResult<Option<Booking>>;

    async fn list_stale_pending_bookings(&self, created_before: DateTime<Utc>) -> CoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_settings(&self) -> CoreResult<Option<PlatformSettings>>;

    async fn save_settings(&self, settings: &PlatformSettings) -> CoreResult<PlatformSettings>;
}

/// Everything the service needs from persistence.
pub trait Store:
    PilotRepository
    + PassengerRepository
    + MeisterRepository
    + AdminRepository
    + SessionRepository
    + FlightRepository
    + BookingRepository
    + SettingsRepository
{
}

impl<T> Store for T where
    T: PilotRepository
        + PassengerRepository
        + MeisterRepository
        + AdminRepository
        + SessionRepository
        + FlightRepository
        + BookingRepository
        + SettingsRepository
{
}
