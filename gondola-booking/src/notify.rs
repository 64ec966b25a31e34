use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gondola_core::payment::ProviderResult;
use gondola_core::sms::SmsSender;
use gondola_shared::models::events::{BookingCanceledEvent, BookingConfirmedEvent, FlightCanceledEvent};
use gondola_shared::Masked;

/// Turns booking events into SMS messages. Delivery failures are logged and
/// swallowed; a lost text must never roll back a booking.
pub struct Notifier {
    sms: Arc<dyn SmsSender>,
}

impl Notifier {
    pub fn new(sms: Arc<dyn SmsSender>) -> Self {
        Self { sms }
    }

    pub async fn booking_confirmed(&self, event: &BookingConfirmedEvent) {
        let when = event.departure_time.format("%Y-%m-%d %H:%M UTC");
        let to_passenger = format!(
            "Your balloon flight \"{}\" on {} from {} is confirmed. Pilot: {}. Booking {}.",
            event.flight_title, when, event.launch_site, event.pilot_name, short(event.booking_id)
        );
        let to_pilot = format!(
            "New confirmed passenger {} for \"{}\" on {}.",
            event.passenger_name, event.flight_title, when
        );

        self.deliver(&event.passenger_phone, &to_passenger).await;
        self.deliver(&event.pilot_phone, &to_pilot).await;
    }

    pub async fn booking_canceled(&self, event: &BookingCanceledEvent) {
        let refund = if event.refunded {
            " Your payment has been refunded."
        } else {
            ""
        };
        let body = format!(
            "Your booking {} for \"{}\" on {} was canceled.{}",
            short(event.booking_id),
            event.flight_title,
            event.departure_time.format("%Y-%m-%d %H:%M UTC"),
            refund
        );
        self.deliver(&event.passenger_phone, &body).await;
    }

    pub async fn flight_canceled(&self, event: &FlightCanceledEvent) {
        let body = format!(
            "The balloon flight \"{}\" on {} has been canceled by the pilot. Any payment will be refunded.",
            event.flight_title,
            event.departure_time.format("%Y-%m-%d %H:%M UTC")
        );
        for phone in &event.passenger_phones {
            self.deliver(phone, &body).await;
        }
    }

    async fn deliver(&self, to: &Masked<String>, body: &str) {
        if to.expose().trim().is_empty() {
            tracing::warn!("Skipping SMS without phone number");
            return;
        }
        match self.sms.send(to.expose(), body).await {
            Ok(()) => tracing::debug!("SMS sent to {}", to.hint()),
            Err(e) => tracing::error!("SMS to {} failed: {}", to.hint(), e),
        }
    }
}

fn short(id: uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Sender that only writes to the log; used when no SMS provider is configured.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()> {
        tracing::info!("SMS to {}: {}", Masked(to.to_string()).hint(), body);
        Ok(())
    }
}

/// Sender that keeps every message in memory.
#[derive(Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    struct FailingSender;

    #[async_trait]
    impl SmsSender for FailingSender {
        async fn send(&self, _to: &str, _body: &str) -> ProviderResult<()> {
            Err("provider down".into())
        }
    }

    fn confirmed() -> BookingConfirmedEvent {
        BookingConfirmedEvent {
            booking_id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            flight_title: "Sunset over Albuquerque".to_string(),
            departure_time: Utc::now(),
            launch_site: "Balloon Fiesta Park".to_string(),
            passenger_name: "Ada".to_string(),
            passenger_phone: Masked("+15550001".to_string()),
            pilot_name: "Joe".to_string(),
            pilot_phone: Masked("+15550002".to_string()),
            amount_cents: 45_000,
            currency: "USD".to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn test_confirmation_reaches_passenger_and_pilot() {
        let sms = Arc::new(RecordingSmsSender::new());
        let notifier = Notifier::new(sms.clone());

        notifier.booking_confirmed(&confirmed()).await;

        let sent = sms.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "+15550001");
        assert!(sent[0].1.contains("is confirmed"));
        assert_eq!(sent[1].0, "+15550002");
        assert!(sent[1].1.contains("Ada"));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSender));
        notifier.booking_confirmed(&confirmed()).await;
    }

    #[tokio::test]
    async fn test_flight_cancellation_fans_out() {
        let sms = Arc::new(RecordingSmsSender::new());
        let notifier = Notifier::new(sms.clone());

        notifier
            .flight_canceled(&FlightCanceledEvent {
                flight_id: Uuid::new_v4(),
                flight_title: "Dawn patrol".to_string(),
                departure_time: Utc::now(),
                passenger_phones: vec![Masked("+1".to_string()), Masked("".to_string()), Masked("+2".to_string())],
                timestamp: 0,
            })
            .await;

        let recipients: Vec<String> = sms.sent().into_iter().map(|(to, _)| to).collect();
        assert_eq!(recipients, vec!["+1".to_string(), "+2".to_string()]);
    }
}
