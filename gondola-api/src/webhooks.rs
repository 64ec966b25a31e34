use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

/// Only the id is read; status comes from the provider itself.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
}

const SETTLING_EVENTS: [&str; 4] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "checkout.session.expired",
    "checkout.session.async_payment_failed",
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/webhooks/payments", post(handle_payment_webhook))
}

/// POST /api/webhooks/payments
/// Receive checkout session updates from the payment provider
async fn handle_payment_webhook(
    State(state): State<AppState>,
    AppJson(payload): AppJson<PaymentWebhook>,
) -> Result<Json<Value>, AppError> {
    let session_id = &payload.data.object.id;
    tracing::info!(
        "Received webhook {} ({}) for checkout {}",
        payload.id.as_deref().unwrap_or("-"),
        payload.type_,
        session_id
    );

    if !SETTLING_EVENTS.contains(&payload.type_.as_str()) {
        tracing::debug!("Ignoring webhook event type {}", payload.type_);
        return Ok(Json(json!({ "received": true })));
    }

    match state.desk.settle_checkout(session_id).await? {
        Some(booking) => {
            tracing::info!("Checkout {} settled, booking {} is {}", session_id, booking.id, booking.status);
            Ok(Json(json!({ "received": true, "booking_id": booking.id, "status": booking.status })))
        }
        None => {
            tracing::warn!("No booking found for checkout {}", session_id);
            Ok(Json(json!({ "received": true })))
        }
    }
}
