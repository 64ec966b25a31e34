use std::sync::Arc;

use chrono::{DateTime, Utc};
use gondola_core::payment::CheckoutStatus;
use gondola_core::{
    Booking, BookingStatus, Flight, FlightStatus, NewBooking, Passenger, PlatformSettings, Store,
};
use gondola_shared::models::events::{BookingCanceledEvent, BookingConfirmedEvent, FlightCanceledEvent};
use serde::Serialize;
use uuid::Uuid;

use crate::finance::FeeSplit;
use crate::lifecycle::{ensure_transition, BookingError};
use crate::notify::Notifier;
use crate::orchestrator::CheckoutOrchestrator;

/// Who asked for a cancellation; decides what may be canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    Passenger(Uuid),
    Pilot(Uuid),
    Admin,
    /// Expired checkout or stale pending booking
    System,
}

impl CancelActor {
    pub fn label(&self) -> &'static str {
        match self {
            CancelActor::Passenger(_) => "passenger",
            CancelActor::Pilot(_) => "pilot",
            CancelActor::Admin => "admin",
            CancelActor::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservedBooking {
    pub booking: Booking,
    pub checkout_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refunded: bool,
}

/// Booking workflows: reservation with checkout, payment settlement,
/// cancellations with refunds, and the pending-booking sweep.
pub struct BookingDesk {
    store: Arc<dyn Store>,
    checkout: CheckoutOrchestrator,
    notifier: Notifier,
    default_fee_bps: u32,
}

impl BookingDesk {
    pub fn new(
        store: Arc<dyn Store>,
        checkout: CheckoutOrchestrator,
        notifier: Notifier,
        default_fee_bps: u32,
    ) -> Self {
        Self {
            store,
            checkout,
            notifier,
            default_fee_bps,
        }
    }

    /// Stored settings, or the configured defaults when none were saved yet.
    pub async fn settings(&self) -> Result<PlatformSettings, BookingError> {
        match self.store.get_settings().await? {
            Some(settings) => Ok(settings),
            None => Ok(PlatformSettings::new(self.default_fee_bps)?),
        }
    }

    /// Reserve a seat for `passenger` and open a checkout for it.
    pub async fn reserve(&self, passenger: &Passenger, flight_id: Uuid) -> Result<ReservedBooking, BookingError> {
        let now = Utc::now();
        let flight = self
            .store
            .get_flight(flight_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("flight {}", flight_id)))?
            .flight;

        if !flight.is_bookable(now) {
            return Err(BookingError::FlightClosed(format!("flight {} is {} or departed", flight.id, flight.status.as_str())));
        }

        let pilot = self
            .store
            .get_pilot(flight.pilot_id)
            .await?
            .ok_or_else(|| BookingError::PilotUnavailable(format!("pilot {} not found", flight.pilot_id)))?;
        if !pilot.is_active() {
            return Err(BookingError::PilotUnavailable(format!("pilot {} is not active", pilot.id)));
        }

        let settings = self.settings().await?;
        let split = FeeSplit::compute(flight.price_cents, settings.fee_bps)?;

        let booking = self
            .store
            .reserve_booking(&NewBooking {
                flight_id: flight.id,
                passenger_id: passenger.id,
                amount_cents: split.price_cents,
                platform_fee_cents: split.platform_fee_cents,
                pilot_payout_cents: split.pilot_payout_cents,
                currency: flight.currency.clone(),
            })
            .await?;

        tracing::info!(
            "Booking {} reserved on flight {} (fee {} bps: platform {} / pilot {})",
            booking.id,
            flight.id,
            split.fee_bps,
            split.platform_fee_cents,
            split.pilot_payout_cents
        );

        let session = match self
            .checkout
            .open_checkout(&booking, &flight, &pilot, Some(passenger.email.expose().as_str()))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                // free the seat again
                self.store
                    .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Canceled, None)
                    .await?;
                return Err(e);
            }
        };

        let booking = self
            .store
            .attach_checkout_session(booking.id, &session.id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking.id)))?;

        Ok(ReservedBooking {
            booking,
            checkout_url: session.url,
        })
    }

    /// Apply the provider's state of a checkout session to its booking.
    /// Returns `None` when no booking belongs to the session.
    pub async fn settle_checkout(&self, session_id: &str) -> Result<Option<Booking>, BookingError> {
        let local = self.store.find_booking_by_checkout(session_id).await?;
        let session = match self.checkout.resolve(session_id).await {
            Ok(session) => session,
            Err(e) if local.is_none() => {
                tracing::warn!("Checkout {} is unknown here and at the provider: {}", session_id, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let booking = match local {
            Some(booking) => booking,
            None => match session.booking_id {
                Some(id) => match self.store.get_booking(id).await? {
                    Some(booking) => booking,
                    None => return Ok(None),
                },
                None => return Ok(None),
            },
        };

        match session.status {
            CheckoutStatus::Open => Ok(Some(booking)),
            CheckoutStatus::Paid => self.confirm_paid(booking, session.payment_reference.as_deref()).await.map(Some),
            CheckoutStatus::Expired => {
                if booking.status != BookingStatus::Pending {
                    return Ok(Some(booking));
                }
                let canceled = self
                    .store
                    .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Canceled, None)
                    .await?;
                tracing::info!("Booking {} canceled after checkout {} expired", booking.id, session_id);
                Ok(Some(canceled.unwrap_or(booking)))
            }
        }
    }

    async fn confirm_paid(&self, booking: Booking, payment_reference: Option<&str>) -> Result<Booking, BookingError> {
        match booking.status {
            BookingStatus::Confirmed => Ok(booking),
            // paid bookings were refunded when they were canceled
            BookingStatus::Canceled if booking.paid => Ok(booking),
            BookingStatus::Canceled => self.refund_late_payment(booking, payment_reference).await,
            BookingStatus::Pending => {
                ensure_transition(BookingStatus::Pending, BookingStatus::Confirmed)?;
                let confirmed = self
                    .store
                    .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Confirmed, payment_reference)
                    .await?;

                let Some(confirmed) = confirmed else {
                    // lost a race, most likely against a cancellation
                    let current = self
                        .store
                        .get_booking(booking.id)
                        .await?
                        .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking.id)))?;
                    return match current.status {
                        BookingStatus::Canceled => self.refund_late_payment(current, payment_reference).await,
                        _ => Ok(current),
                    };
                };

                tracing::info!("Booking {} confirmed and paid", confirmed.id);
                if let Err(e) = self.announce_confirmation(&confirmed).await {
                    tracing::error!("Could not notify confirmation of booking {}: {}", confirmed.id, e);
                }
                Ok(confirmed)
            }
        }
    }

    /// Record money that arrived for a canceled booking and send it back.
    /// Only the delivery that records the payment issues the refund.
    async fn refund_late_payment(&self, booking: Booking, payment_reference: Option<&str>) -> Result<Booking, BookingError> {
        let Some(recorded) = self.store.record_late_payment(booking.id, payment_reference).await? else {
            tracing::debug!("Late payment for booking {} was already handled", booking.id);
            return Ok(self.store.get_booking(booking.id).await?.unwrap_or(booking));
        };

        tracing::warn!("Payment arrived for canceled booking {}, refunding", recorded.id);
        if let Err(e) = self.checkout.refund(&recorded).await {
            tracing::error!("Late payment on booking {} needs a manual refund: {}", recorded.id, e);
        }
        Ok(recorded)
    }

    async fn announce_confirmation(&self, booking: &Booking) -> Result<(), BookingError> {
        let flight = self.flight(booking.flight_id).await?;
        let passenger = self
            .store
            .get_passenger(booking.passenger_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("passenger {}", booking.passenger_id)))?;
        let pilot = self
            .store
            .get_pilot(flight.pilot_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("pilot {}", flight.pilot_id)))?;

        self.notifier
            .booking_confirmed(&BookingConfirmedEvent {
                booking_id: booking.id,
                flight_id: flight.id,
                flight_title: flight.title.clone(),
                departure_time: flight.departure_time,
                launch_site: flight.launch_site.clone(),
                passenger_name: passenger.name.clone(),
                passenger_phone: passenger.phone.clone(),
                pilot_name: pilot.name.clone(),
                pilot_phone: pilot.phone.clone(),
                amount_cents: booking.amount_cents,
                currency: booking.currency.clone(),
                timestamp: Utc::now().timestamp(),
            })
            .await;
        Ok(())
    }

    /// Cancel one booking on behalf of `actor`, refunding it when it was paid.
    pub async fn cancel(&self, booking_id: Uuid, actor: CancelActor) -> Result<CancelOutcome, BookingError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;
        let flight = self.flight(booking.flight_id).await?;

        match actor {
            CancelActor::Passenger(id) if id != booking.passenger_id => {
                return Err(BookingError::NotFound(format!("booking {}", booking_id)));
            }
            CancelActor::Pilot(id) if id != flight.pilot_id => {
                return Err(BookingError::Forbidden(format!("booking {} is not on your flight", booking_id)));
            }
            _ => {}
        }

        let outcome = self.cancel_booking(booking, actor).await?;
        self.announce_cancellation(&outcome, &flight, actor).await;
        Ok(outcome)
    }

    async fn cancel_booking(&self, booking: Booking, actor: CancelActor) -> Result<CancelOutcome, BookingError> {
        ensure_transition(booking.status, BookingStatus::Canceled)?;

        let canceled = self
            .store
            .transition_booking(booking.id, booking.status, BookingStatus::Canceled, None)
            .await?
            .ok_or(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Canceled,
            })?;

        let refunded = if booking.status == BookingStatus::Confirmed {
            match self.checkout.refund(&canceled).await {
                Ok(refunded) => refunded,
                Err(e) => {
                    tracing::error!("Booking {} canceled but refund needs manual follow-up: {}", canceled.id, e);
                    false
                }
            }
        } else {
            false
        };

        tracing::info!("Booking {} canceled by {} (refunded: {})", canceled.id, actor.label(), refunded);
        Ok(CancelOutcome {
            booking: canceled,
            refunded,
        })
    }

    async fn announce_cancellation(&self, outcome: &CancelOutcome, flight: &Flight, actor: CancelActor) {
        if actor == CancelActor::System {
            return;
        }
        let passenger = match self.store.get_passenger(outcome.booking.passenger_id).await {
            Ok(Some(passenger)) => passenger,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Could not load passenger for cancellation notice: {}", e);
                return;
            }
        };
        self.notifier
            .booking_canceled(&BookingCanceledEvent {
                booking_id: outcome.booking.id,
                flight_id: flight.id,
                flight_title: flight.title.clone(),
                departure_time: flight.departure_time,
                passenger_phone: passenger.phone,
                refunded: outcome.refunded,
                canceled_by: actor.label().to_string(),
                timestamp: Utc::now().timestamp(),
            })
            .await;
    }

    /// Cancel a pilot's flight and every live booking on it. Calling it again
    /// on a canceled flight that still has live bookings finishes the job.
    pub async fn cancel_flight(&self, pilot_id: Uuid, flight_id: Uuid) -> Result<(Flight, Vec<CancelOutcome>), BookingError> {
        let flight = self.flight(flight_id).await?;
        if flight.pilot_id != pilot_id {
            return Err(BookingError::NotFound(format!("flight {}", flight_id)));
        }

        let resuming = flight.status == FlightStatus::Canceled;
        let flight = if resuming {
            flight
        } else {
            self.store
                .set_flight_status(flight_id, FlightStatus::Canceled)
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("flight {}", flight_id)))?
        };

        let live: Vec<Booking> = self
            .store
            .list_bookings_by_flight(flight_id)
            .await?
            .into_iter()
            .filter(|b| b.status.is_live())
            .collect();
        if resuming && live.is_empty() {
            return Err(BookingError::FlightClosed(format!("flight {} is already canceled", flight_id)));
        }

        let mut outcomes = Vec::new();
        let mut phones = Vec::new();
        let mut left_live = 0;
        for booking in live {
            let booking_id = booking.id;
            let passenger_id = booking.passenger_id;
            match self.cancel_booking(booking, CancelActor::Pilot(pilot_id)).await {
                Ok(outcome) => outcomes.push(outcome),
                // a webhook or the passenger got there first
                Err(BookingError::InvalidTransition { .. }) => continue,
                Err(e) => {
                    tracing::error!("Booking {} on canceled flight {} is still live: {}", booking_id, flight_id, e);
                    left_live += 1;
                    continue;
                }
            }
            match self.store.get_passenger(passenger_id).await {
                Ok(Some(passenger)) => phones.push(passenger.phone),
                Ok(None) => {}
                Err(e) => tracing::error!("Could not load passenger {} for cancellation notice: {}", passenger_id, e),
            }
        }

        if left_live > 0 {
            tracing::warn!("Flight {} canceled with {} bookings still live, cancel again to retry", flight.id, left_live);
        } else {
            tracing::info!("Flight {} canceled, {} bookings canceled", flight.id, outcomes.len());
        }
        self.notifier
            .flight_canceled(&FlightCanceledEvent {
                flight_id: flight.id,
                flight_title: flight.title.clone(),
                departure_time: flight.departure_time,
                passenger_phones: phones,
                timestamp: Utc::now().timestamp(),
            })
            .await;

        Ok((flight, outcomes))
    }

    /// Settle pending bookings created before `cutoff`: confirm the ones the
    /// provider reports as paid, cancel the rest. Returns how many were released.
    pub async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, BookingError> {
        let mut released = 0;
        for booking in self.store.list_stale_pending_bookings(cutoff).await? {
            let paid = match booking.checkout_session_id.as_deref() {
                Some(session_id) => match self.checkout.resolve(session_id).await {
                    Ok(session) if session.status == CheckoutStatus::Paid => Some(session),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Could not check checkout {} before release: {}", session_id, e);
                        None
                    }
                },
                None => None,
            };
            if let Some(session) = paid {
                // the webhook has not arrived yet
                tracing::info!("Stale booking {} was paid, confirming", booking.id);
                self.confirm_paid(booking, session.payment_reference.as_deref()).await?;
                continue;
            }

            let canceled = self
                .store
                .transition_booking(booking.id, BookingStatus::Pending, BookingStatus::Canceled, None)
                .await?;
            if canceled.is_some() {
                tracing::info!("Released stale pending booking {}", booking.id);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn flight(&self, flight_id: Uuid) -> Result<Flight, BookingError> {
        self.store
            .get_flight(flight_id)
            .await?
            .map(|load| load.flight)
            .ok_or_else(|| BookingError::NotFound(format!("flight {}", flight_id)))
    }
}
