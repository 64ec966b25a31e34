use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use gondola_core::payment::{CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentProvider, ProviderResult};
use gondola_core::{Booking, Flight, Pilot};
use uuid::Uuid;

use crate::lifecycle::BookingError;

/// Builds checkout requests for bookings and talks to the payment provider.
pub struct CheckoutOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    public_base_url: String,
    checkout_ttl: Option<Duration>,
}

impl CheckoutOrchestrator {
    pub fn new(provider: Arc<dyn PaymentProvider>, public_base_url: impl Into<String>) -> Self {
        Self {
            provider,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            checkout_ttl: None,
        }
    }

    /// Ask the provider to close checkouts after `ttl`, so nobody pays for a
    /// seat the sweep already released.
    pub fn with_checkout_ttl(mut self, ttl: Duration) -> Self {
        self.checkout_ttl = Some(ttl);
        self
    }

    pub fn build_request(
        &self,
        booking: &Booking,
        flight: &Flight,
        pilot: &Pilot,
        customer_email: Option<&str>,
    ) -> CheckoutRequest {
        CheckoutRequest {
            booking_id: booking.id,
            description: format!(
                "{} ({}, {})",
                flight.title,
                flight.launch_site,
                flight.departure_time.format("%Y-%m-%d %H:%M UTC")
            ),
            amount_cents: booking.amount_cents,
            currency: booking.currency.clone(),
            platform_fee_cents: booking.platform_fee_cents,
            destination_account: pilot.payout_account_id.clone(),
            customer_email: customer_email.map(str::to_string),
            success_url: format!("{}/bookings/{}/success", self.public_base_url, booking.id),
            cancel_url: format!("{}/bookings/{}/canceled", self.public_base_url, booking.id),
            expires_at: self.checkout_ttl.map(|ttl| Utc::now() + ttl),
        }
    }

    /// Create the hosted checkout for a pending booking
    pub async fn open_checkout(
        &self,
        booking: &Booking,
        flight: &Flight,
        pilot: &Pilot,
        customer_email: Option<&str>,
    ) -> Result<CheckoutSession, BookingError> {
        let request = self.build_request(booking, flight, pilot, customer_email);
        self.provider.create_checkout(&request).await.map_err(|e| {
            tracing::error!("Checkout creation failed for booking {}: {}", booking.id, e);
            BookingError::Payment(e.to_string())
        })
    }

    /// Fetch the provider's view of a checkout (webhook payloads are not trusted)
    pub async fn resolve(&self, session_id: &str) -> Result<CheckoutSession, BookingError> {
        self.provider
            .get_checkout(session_id)
            .await
            .map_err(|e| BookingError::Payment(e.to_string()))
    }

    /// Refund a paid booking. Returns false when there is nothing to refund.
    pub async fn refund(&self, booking: &Booking) -> Result<bool, BookingError> {
        let Some(reference) = booking.payment_reference.as_deref() else {
            return Ok(false);
        };
        self.provider.refund(reference).await.map_err(|e| {
            tracing::error!("Refund failed for booking {} ({}): {}", booking.id, reference, e);
            BookingError::Payment(e.to_string())
        })?;
        tracing::info!("Refunded booking {}", booking.id);
        Ok(true)
    }
}

/// In-process provider for development and tests. Every checkout counts as
/// paid unless it was explicitly expired.
#[derive(Default)]
pub struct MockPaymentProvider {
    base_url: String,
    requests: Mutex<Vec<CheckoutRequest>>,
    overrides: Mutex<HashMap<String, CheckoutStatus>>,
    refunds: Mutex<Vec<String>>,
    fail_checkout: Mutex<bool>,
}

impl MockPaymentProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn session_id_for(booking_id: Uuid) -> String {
        format!("mock_cs_{}", booking_id.simple())
    }

    pub fn expire(&self, session_id: &str) {
        self.set_status(session_id, CheckoutStatus::Expired);
    }

    pub fn keep_open(&self, session_id: &str) {
        self.set_status(session_id, CheckoutStatus::Open);
    }

    /// Make the next checkout creation fail
    pub fn fail_next_checkout(&self) {
        *lock(&self.fail_checkout) = true;
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        lock(&self.requests).clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        lock(&self.refunds).clone()
    }

    fn set_status(&self, session_id: &str, status: CheckoutStatus) {
        lock(&self.overrides).insert(session_id.to_string(), status);
    }

    fn booking_id_of(session_id: &str) -> Option<Uuid> {
        session_id
            .strip_prefix("mock_cs_")
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<CheckoutSession> {
        {
            let mut fail = lock(&self.fail_checkout);
            if *fail {
                *fail = false;
                return Err("Simulated payment gateway failure".into());
            }
        }

        lock(&self.requests).push(request.clone());
        let id = Self::session_id_for(request.booking_id);
        Ok(CheckoutSession {
            url: Some(format!("{}/mock-checkout/{}", self.base_url, id)),
            id,
            status: CheckoutStatus::Open,
            booking_id: Some(request.booking_id),
            payment_reference: None,
        })
    }

    async fn get_checkout(&self, session_id: &str) -> ProviderResult<CheckoutSession> {
        let booking_id = Self::booking_id_of(session_id).ok_or("unknown checkout session")?;
        let status = lock(&self.overrides)
            .get(session_id)
            .copied()
            .unwrap_or(CheckoutStatus::Paid);

        Ok(CheckoutSession {
            id: session_id.to_string(),
            url: None,
            status,
            booking_id: Some(booking_id),
            payment_reference: (status == CheckoutStatus::Paid)
                .then(|| format!("mock_pi_{}", booking_id.simple())),
        })
    }

    async fn refund(&self, payment_reference: &str) -> ProviderResult<()> {
        lock(&self.refunds).push(payment_reference.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gondola_core::{FlightStatus, NewBooking};
    use gondola_shared::Masked;

    fn fixtures() -> (Booking, Flight, Pilot) {
        let now = Utc::now();
        let pilot = Pilot {
            id: Uuid::new_v4(),
            name: "Bertrand Piccard".to_string(),
            email: Masked("bp@example.com".to_string()),
            phone: Masked("+41790000000".to_string()),
            password_hash: String::new(),
            license_number: "CH-BFCL-001".to_string(),
            balloon_registration: Some("HB-QAX".to_string()),
            payout_account_id: Some("acct_123".to_string()),
            approved: true,
            blocked: false,
            created_at: now,
        };
        let flight = Flight {
            id: Uuid::new_v4(),
            pilot_id: pilot.id,
            title: "Morning glide".to_string(),
            description: None,
            launch_site: "Château-d'Oex".to_string(),
            departure_time: now + Duration::days(2),
            duration_minutes: 60,
            price_cents: 30_000,
            currency: "CHF".to_string(),
            max_passengers: 4,
            status: FlightStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        let booking = NewBooking {
            flight_id: flight.id,
            passenger_id: Uuid::new_v4(),
            amount_cents: 30_000,
            platform_fee_cents: 3_000,
            pilot_payout_cents: 27_000,
            currency: "CHF".to_string(),
        }
        .into_pending(now);
        (booking, flight, pilot)
    }

    #[test]
    fn test_request_carries_fee_split_and_destination() {
        let provider = Arc::new(MockPaymentProvider::new("http://localhost"));
        let orchestrator = CheckoutOrchestrator::new(provider, "https://gondola.example/");
        let (booking, flight, pilot) = fixtures();

        let request = orchestrator.build_request(&booking, &flight, &pilot, Some("p@example.com"));
        assert_eq!(request.amount_cents, 30_000);
        assert_eq!(request.platform_fee_cents, 3_000);
        assert_eq!(request.destination_account.as_deref(), Some("acct_123"));
        assert_eq!(
            request.success_url,
            format!("https://gondola.example/bookings/{}/success", booking.id)
        );
        assert!(request.expires_at.is_none());
    }

    #[test]
    fn test_checkout_expires_with_the_hold() {
        let provider = Arc::new(MockPaymentProvider::new("http://localhost"));
        let orchestrator =
            CheckoutOrchestrator::new(provider, "http://localhost").with_checkout_ttl(Duration::minutes(30));
        let (booking, flight, pilot) = fixtures();

        let before = Utc::now();
        let request = orchestrator.build_request(&booking, &flight, &pilot, None);
        let expires_at = request.expires_at.unwrap();
        assert!(expires_at >= before + Duration::minutes(30));
        assert!(expires_at <= Utc::now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_mock_checkout_round() {
        let provider = Arc::new(MockPaymentProvider::new("http://localhost"));
        let orchestrator = CheckoutOrchestrator::new(provider.clone(), "http://localhost");
        let (booking, flight, pilot) = fixtures();

        let session = orchestrator.open_checkout(&booking, &flight, &pilot, None).await.unwrap();
        assert_eq!(session.status, CheckoutStatus::Open);
        assert_eq!(provider.requests().len(), 1);

        let paid = orchestrator.resolve(&session.id).await.unwrap();
        assert_eq!(paid.status, CheckoutStatus::Paid);
        assert_eq!(paid.booking_id, Some(booking.id));

        provider.expire(&session.id);
        let expired = orchestrator.resolve(&session.id).await.unwrap();
        assert_eq!(expired.status, CheckoutStatus::Expired);
        assert!(expired.payment_reference.is_none());
    }

    #[tokio::test]
    async fn test_refund_without_payment_is_noop() {
        let provider = Arc::new(MockPaymentProvider::new("http://localhost"));
        let orchestrator = CheckoutOrchestrator::new(provider.clone(), "http://localhost");
        let (booking, _, _) = fixtures();

        assert!(!orchestrator.refund(&booking).await.unwrap());
        assert!(provider.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_failure_is_reported() {
        let provider = Arc::new(MockPaymentProvider::new("http://localhost"));
        let orchestrator = CheckoutOrchestrator::new(provider.clone(), "http://localhost");
        let (booking, flight, pilot) = fixtures();

        provider.fail_next_checkout();
        let err = orchestrator.open_checkout(&booking, &flight, &pilot, None).await.unwrap_err();
        assert!(matches!(err, BookingError::Payment(_)));
        assert!(orchestrator.open_checkout(&booking, &flight, &pilot, None).await.is_ok());
    }
}
