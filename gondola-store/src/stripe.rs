use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gondola_core::payment::{CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentProvider, ProviderResult};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Stripe Checkout with Connect destination charges.
pub struct StripeClient {
    http_client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<StripeSession> for CheckoutSession {
    fn from(session: StripeSession) -> Self {
        let status = match (session.status.as_deref(), session.payment_status.as_deref()) {
            (Some("complete"), Some("paid")) | (Some("complete"), Some("no_payment_required")) => CheckoutStatus::Paid,
            (Some("expired"), _) => CheckoutStatus::Expired,
            _ => CheckoutStatus::Open,
        };
        let booking_id = session
            .metadata
            .get("booking_id")
            .or(session.client_reference_id.as_ref())
            .and_then(|id| Uuid::parse_str(id).ok());

        CheckoutSession {
            id: session.id,
            url: session.url,
            status,
            booking_id,
            payment_reference: session.payment_intent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Stripe only accepts a session expiry between 30 minutes and 24 hours out.
    fn session_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        expires_at.clamp(now + Duration::minutes(31), now + Duration::hours(23))
    }

    fn checkout_form(request: &CheckoutRequest, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.booking_id.to_string()),
            ("metadata[booking_id]", request.booking_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", request.currency.to_lowercase()),
            ("line_items[0][price_data][unit_amount]", request.amount_cents.to_string()),
            ("line_items[0][price_data][product_data][name]", request.description.clone()),
            ("payment_intent_data[metadata][booking_id]", request.booking_id.to_string()),
        ];
        if let Some(account) = &request.destination_account {
            form.push(("payment_intent_data[application_fee_amount]", request.platform_fee_cents.to_string()));
            form.push(("payment_intent_data[transfer_data][destination]", account.clone()));
        }
        if let Some(email) = &request.customer_email {
            form.push(("customer_email", email.clone()));
        }
        if let Some(expires_at) = request.expires_at {
            form.push(("expires_at", Self::session_expiry(expires_at, now).timestamp().to_string()));
        }
        form
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> ProviderResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or(body);
            tracing::error!("Stripe request failed with {}: {}", status, message);
            return Err(format!("stripe returned {}: {}", status, message).into());
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<CheckoutSession> {
        let response = self
            .http_client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("checkout-{}", request.booking_id))
            .form(&Self::checkout_form(request, Utc::now()))
            .send()
            .await?;

        let session: StripeSession = Self::read(response).await?;
        info!("Created Stripe checkout session {} for booking {}", session.id, request.booking_id);
        Ok(session.into())
    }

    async fn get_checkout(&self, session_id: &str) -> ProviderResult<CheckoutSession> {
        let response = self
            .http_client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let session: StripeSession = Self::read(response).await?;
        Ok(session.into())
    }

    async fn refund(&self, payment_reference: &str) -> ProviderResult<()> {
        let form = [
            ("payment_intent", payment_reference),
            ("reverse_transfer", "true"),
            ("refund_application_fee", "true"),
        ];
        let response = self
            .http_client
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("refund-{}", payment_reference))
            .form(&form)
            .send()
            .await?;

        let _: serde_json::Value = Self::read(response).await?;
        info!("Refunded payment {}", payment_reference);
        Ok(())
    }
}
