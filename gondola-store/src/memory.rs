use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gondola_core::repository::{
    AdminRepository, BookingRepository, FlightRepository, MeisterRepository, PassengerRepository, PilotRepository,
    SessionRepository, SettingsRepository,
};
use gondola_core::{
    Admin, Booking, BookingStatus, CoreError, CoreResult, Flight, FlightChanges, FlightLoad, FlightStatus, Meister,
    NewBooking, NewFlight, NewMeister, NewPassenger, NewPilot, Passenger, Pilot, PilotProfileUpdate,
    PlatformSettings, Session,
};
use gondola_shared::Masked;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    pilots: HashMap<Uuid, Pilot>,
    passengers: HashMap<Uuid, Passenger>,
    meisters: HashMap<Uuid, Meister>,
    admins: HashMap<Uuid, Admin>,
    sessions: HashMap<Uuid, Session>,
    flights: HashMap<Uuid, Flight>,
    bookings: HashMap<Uuid, Booking>,
    settings: Option<PlatformSettings>,
}

impl Tables {
    fn booked_seats(&self, flight_id: Uuid) -> i64 {
        self.bookings
            .values()
            .filter(|b| b.flight_id == flight_id && b.status.is_live())
            .count() as i64
    }

    fn load(&self, flight: &Flight) -> FlightLoad {
        FlightLoad {
            flight: flight.clone(),
            booked_seats: self.booked_seats(flight.id),
        }
    }
}

/// Store kept entirely in process memory. Every operation runs under one
/// lock, so check-then-write sequences are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_email(a: &Masked<String>, b: &str) -> bool {
    a.expose().eq_ignore_ascii_case(b)
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl PilotRepository for MemoryStore {
    async fn create_pilot(&self, pilot: &NewPilot) -> CoreResult<Pilot> {
        let mut tables = self.tables.write().await;
        if tables.pilots.values().any(|p| same_email(&p.email, &pilot.email)) {
            return Err(CoreError::Conflict(format!("email {} is already registered", pilot.email)));
        }
        let record = Pilot {
            id: Uuid::new_v4(),
            name: pilot.name.clone(),
            email: Masked(pilot.email.clone()),
            phone: Masked(pilot.phone.clone()),
            password_hash: pilot.password_hash.clone(),
            license_number: pilot.license_number.clone(),
            balloon_registration: pilot.balloon_registration.clone(),
            payout_account_id: None,
            approved: false,
            blocked: false,
            created_at: Utc::now(),
        };
        tables.pilots.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_pilot(&self, id: Uuid) -> CoreResult<Option<Pilot>> {
        Ok(self.tables.read().await.pilots.get(&id).cloned())
    }

    async fn find_pilot_by_email(&self, email: &str) -> CoreResult<Option<Pilot>> {
        let tables = self.tables.read().await;
        Ok(tables.pilots.values().find(|p| same_email(&p.email, email)).cloned())
    }

    async fn list_pilots(&self) -> CoreResult<Vec<Pilot>> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.pilots.values().cloned().collect::<Vec<Pilot>>(), |p| p.created_at))
    }

    async fn update_pilot_profile(&self, id: Uuid, update: &PilotProfileUpdate) -> CoreResult<Option<Pilot>> {
        let mut tables = self.tables.write().await;
        let Some(pilot) = tables.pilots.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(phone) = &update.phone {
            pilot.phone = Masked(phone.clone());
        }
        if let Some(license) = &update.license_number {
            pilot.license_number = license.clone();
        }
        if let Some(registration) = &update.balloon_registration {
            pilot.balloon_registration = Some(registration.clone());
        }
        if let Some(account) = &update.payout_account_id {
            pilot.payout_account_id = Some(account.clone());
        }
        Ok(Some(pilot.clone()))
    }

    async fn set_pilot_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Pilot>> {
        let mut tables = self.tables.write().await;
        Ok(tables.pilots.get_mut(&id).map(|p| {
            p.approved = approved;
            p.clone()
        }))
    }

    async fn set_pilot_blocked(&self, id: Uuid, blocked: bool) -> CoreResult<Option<Pilot>> {
        let mut tables = self.tables.write().await;
        Ok(tables.pilots.get_mut(&id).map(|p| {
            p.blocked = blocked;
            p.clone()
        }))
    }
}

#[async_trait]
impl PassengerRepository for MemoryStore {
    async fn create_passenger(&self, passenger: &NewPassenger) -> CoreResult<Passenger> {
        let mut tables = self.tables.write().await;
        if tables.passengers.values().any(|p| same_email(&p.email, &passenger.email)) {
            return Err(CoreError::Conflict(format!("email {} is already registered", passenger.email)));
        }
        let record = Passenger {
            id: Uuid::new_v4(),
            name: passenger.name.clone(),
            email: Masked(passenger.email.clone()),
            phone: Masked(passenger.phone.clone()),
            password_hash: passenger.password_hash.clone(),
            created_at: Utc::now(),
        };
        tables.passengers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_passenger(&self, id: Uuid) -> CoreResult<Option<Passenger>> {
        Ok(self.tables.read().await.passengers.get(&id).cloned())
    }

    async fn find_passenger_by_email(&self, email: &str) -> CoreResult<Option<Passenger>> {
        let tables = self.tables.read().await;
        Ok(tables.passengers.values().find(|p| same_email(&p.email, email)).cloned())
    }
}

#[async_trait]
impl MeisterRepository for MemoryStore {
    async fn create_meister(&self, meister: &NewMeister) -> CoreResult<Meister> {
        let mut tables = self.tables.write().await;
        if tables.meisters.values().any(|m| same_email(&m.email, &meister.email)) {
            return Err(CoreError::Conflict(format!("email {} is already registered", meister.email)));
        }
        let record = Meister {
            id: Uuid::new_v4(),
            name: meister.name.clone(),
            email: Masked(meister.email.clone()),
            phone: Masked(meister.phone.clone()),
            organization: meister.organization.clone(),
            password_hash: meister.password_hash.clone(),
            approved: false,
            created_at: Utc::now(),
        };
        tables.meisters.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_meister(&self, id: Uuid) -> CoreResult<Option<Meister>> {
        Ok(self.tables.read().await.meisters.get(&id).cloned())
    }

    async fn find_meister_by_email(&self, email: &str) -> CoreResult<Option<Meister>> {
        let tables = self.tables.read().await;
        Ok(tables.meisters.values().find(|m| same_email(&m.email, email)).cloned())
    }

    async fn list_meisters(&self) -> CoreResult<Vec<Meister>> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.meisters.values().cloned().collect::<Vec<Meister>>(), |m| m.created_at))
    }

    async fn set_meister_approved(&self, id: Uuid, approved: bool) -> CoreResult<Option<Meister>> {
        let mut tables = self.tables.write().await;
        Ok(tables.meisters.get_mut(&id).map(|m| {
            m.approved = approved;
            m.clone()
        }))
    }
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn create_admin(&self, email: &str, password_hash: &str) -> CoreResult<Admin> {
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| same_email(&a.email, email)) {
            return Err(CoreError::Conflict(format!("admin {} already exists", email)));
        }
        let record = Admin {
            id: Uuid::new_v4(),
            email: Masked(email.to_string()),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.admins.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_admin(&self, id: Uuid) -> CoreResult<Option<Admin>> {
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn find_admin_by_email(&self, email: &str) -> CoreResult<Option<Admin>> {
        let tables = self.tables.read().await;
        Ok(tables.admins.values().find(|a| same_email(&a.email, email)).cloned())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, session: &Session) -> CoreResult<()> {
        self.tables.write().await.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&self, token_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash && !s.is_expired(now))
            .cloned())
    }

    async fn delete_session(&self, id: Uuid) -> CoreResult<()> {
        self.tables.write().await.sessions.remove(&id);
        Ok(())
    }

    async fn delete_sessions_for_account(&self, account_id: Uuid) -> CoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl FlightRepository for MemoryStore {
    async fn create_flight(&self, flight: &NewFlight) -> CoreResult<Flight> {
        let mut tables = self.tables.write().await;
        if !tables.pilots.contains_key(&flight.pilot_id) {
            return Err(CoreError::NotFound(format!("pilot {}", flight.pilot_id)));
        }
        let now = Utc::now();
        let record = Flight {
            id: Uuid::new_v4(),
            pilot_id: flight.pilot_id,
            title: flight.title.clone(),
            description: flight.description.clone(),
            launch_site: flight.launch_site.clone(),
            departure_time: flight.departure_time,
            duration_minutes: flight.duration_minutes,
            price_cents: flight.price_cents,
            currency: flight.currency.clone(),
            max_passengers: flight.max_passengers,
            status: FlightStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        tables.flights.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<FlightLoad>> {
        let tables = self.tables.read().await;
        Ok(tables.flights.get(&id).map(|f| tables.load(f)))
    }

    async fn list_upcoming_flights(&self, now: DateTime<Utc>) -> CoreResult<Vec<FlightLoad>> {
        let tables = self.tables.read().await;
        let loads: Vec<FlightLoad> = tables
            .flights
            .values()
            .filter(|f| f.status == FlightStatus::Scheduled && f.departure_time > now)
            .map(|f| tables.load(f))
            .collect();
        Ok(sorted_by(loads, |l| l.flight.departure_time))
    }

    async fn list_flights_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<FlightLoad>> {
        let tables = self.tables.read().await;
        let loads: Vec<FlightLoad> = tables
            .flights
            .values()
            .filter(|f| f.pilot_id == pilot_id)
            .map(|f| tables.load(f))
            .collect();
        Ok(sorted_by(loads, |l| l.flight.departure_time))
    }

    async fn update_flight(&self, id: Uuid, changes: &FlightChanges) -> CoreResult<Option<Flight>> {
        let mut tables = self.tables.write().await;
        let booked = tables.booked_seats(id);
        let Some(flight) = tables.flights.get_mut(&id) else {
            return Ok(None);
        };
        if flight.status == FlightStatus::Canceled {
            return Err(CoreError::Conflict(format!("flight {} is canceled", id)));
        }
        if let Some(max) = changes.max_passengers {
            if i64::from(max) < booked {
                return Err(CoreError::Conflict(format!(
                    "flight {} already has {} live bookings, cannot reduce capacity to {}",
                    id, booked, max
                )));
            }
        }
        changes.apply(flight);
        flight.updated_at = Utc::now();
        Ok(Some(flight.clone()))
    }

    async fn set_flight_status(&self, id: Uuid, status: FlightStatus) -> CoreResult<Option<Flight>> {
        let mut tables = self.tables.write().await;
        Ok(tables.flights.get_mut(&id).map(|f| {
            f.status = status;
            f.updated_at = Utc::now();
            f.clone()
        }))
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn reserve_booking(&self, booking: &NewBooking) -> CoreResult<Booking> {
        let mut tables = self.tables.write().await;

        let flight = tables
            .flights
            .get(&booking.flight_id)
            .ok_or_else(|| CoreError::NotFound(format!("flight {}", booking.flight_id)))?;
        if flight.status != FlightStatus::Scheduled {
            return Err(CoreError::Conflict(format!("flight {} is canceled", flight.id)));
        }
        let max_passengers = flight.max_passengers;

        let already_booked = tables.bookings.values().any(|b| {
            b.flight_id == booking.flight_id && b.passenger_id == booking.passenger_id && b.status.is_live()
        });
        if already_booked {
            return Err(CoreError::Conflict(format!(
                "passenger already holds a booking on flight {}",
                booking.flight_id
            )));
        }

        if tables.booked_seats(booking.flight_id) >= i64::from(max_passengers) {
            return Err(CoreError::CapacityExceeded {
                flight_id: booking.flight_id,
                max_passengers,
            });
        }

        let record = booking.clone().into_pending(Utc::now());
        tables.bookings.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_checkout(&self, session_id: &str) -> CoreResult<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| b.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.passenger_id == passenger_id)
            .cloned()
            .collect();
        Ok(sorted_by(bookings, |b| b.created_at))
    }

    async fn list_bookings_by_pilot(&self, pilot_id: Uuid) -> CoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| tables.flights.get(&b.flight_id).is_some_and(|f| f.pilot_id == pilot_id))
            .cloned()
            .collect();
        Ok(sorted_by(bookings, |b| b.created_at))
    }

    async fn list_bookings_by_flight(&self, flight_id: Uuid) -> CoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.flight_id == flight_id)
            .cloned()
            .collect();
        Ok(sorted_by(bookings, |b| b.created_at))
    }

    async fn list_all_bookings(&self) -> CoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(sorted_by(tables.bookings.values().cloned().collect::<Vec<Booking>>(), |b| b.created_at))
    }

    async fn list_bookings_with_pilot(&self) -> CoreResult<Vec<(Uuid, Booking)>> {
        let tables = self.tables.read().await;
        let mut pairs: Vec<(Uuid, Booking)> = tables
            .bookings
            .values()
            .filter_map(|b| tables.flights.get(&b.flight_id).map(|f| (f.pilot_id, b.clone())))
            .collect();
        pairs.sort_by_key(|(_, b)| b.created_at);
        Ok(pairs)
    }

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> CoreResult<Option<Booking>> {
        let mut tables = self.tables.write().await;
        Ok(tables.bookings.get_mut(&id).map(|b| {
            b.checkout_session_id = Some(session_id.to_string());
            b.updated_at = Utc::now();
            b.clone()
        }))
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        payment_reference: Option<&str>,
    ) -> CoreResult<Option<Booking>> {
        let mut tables = self.tables.write().await;
        let Some(booking) = tables.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.status != from {
            return Ok(None);
        }

        let now = Utc::now();
        booking.status = to;
        booking.updated_at = now;
        match to {
            BookingStatus::Confirmed => {
                booking.paid = true;
                if let Some(reference) = payment_reference {
                    booking.payment_reference = Some(reference.to_string());
                }
            }
            BookingStatus::Canceled => booking.canceled_at = Some(now),
            BookingStatus::Pending => {}
        }
        Ok(Some(booking.clone()))
    }

    async fn record_late_payment(&self, id: Uuid, payment_reference: Option<&str>) -> CoreResult<Option<Booking>> {
        let mut tables = self.tables.write().await;
        let Some(booking) = tables.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.status != BookingStatus::Canceled || booking.paid {
            return Ok(None);
        }

        booking.paid = true;
        if let Some(reference) = payment_reference {
            booking.payment_reference = Some(reference.to_string());
        }
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn list_stale_pending_bookings(&self, created_before: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < created_before)
            .cloned()
            .collect();
        Ok(sorted_by(bookings, |b| b.created_at))
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_settings(&self) -> CoreResult<Option<PlatformSettings>> {
        Ok(self.tables.read().await.settings.clone())
    }

    async fn save_settings(&self, settings: &PlatformSettings) -> CoreResult<PlatformSettings> {
        let mut tables = self.tables.write().await;
        let saved = PlatformSettings {
            fee_bps: settings.fee_bps,
            updated_at: Utc::now(),
        };
        tables.settings = Some(saved.clone());
        Ok(saved)
    }
}
