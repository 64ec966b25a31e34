use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProviderResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    /// Created, customer has not paid yet.
    Open,
    /// Completed and funds captured.
    Paid,
    /// Expired or payment failed; no money moved.
    Expired,
}

/// Everything the provider needs to build a hosted checkout page for one booking.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub currency: String,
    pub platform_fee_cents: i64,
    /// Pilot's connected account; `None` keeps the full amount on the platform.
    pub destination_account: Option<String>,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Provider stops accepting payment after this; matches the pending hold.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub status: CheckoutStatus,
    pub booking_id: Option<Uuid>,
    /// Provider payment id, needed for refunds.
    pub payment_reference: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<CheckoutSession>;

    /// Retrieve the authoritative state of a checkout session
    async fn get_checkout(&self, session_id: &str) -> ProviderResult<CheckoutSession>;

    /// Refund a captured payment in full, reversing the pilot transfer and platform fee
    async fn refund(&self, payment_reference: &str) -> ProviderResult<()>;
}
