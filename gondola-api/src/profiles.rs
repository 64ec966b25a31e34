use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Extension, Json, Router,
};
use gondola_booking::finance::summarize_payouts;
use gondola_booking::PayoutSummary;
use gondola_core::{Pilot, PilotProfileUpdate};

use crate::error::{AppError, AppJson};
use crate::middleware::{authenticate, require_pilot, Principal};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/pilot/profile", get(get_profile).put(update_profile))
        .route("/api/pilot/payouts", get(own_payouts))
        .route_layer(from_fn(require_pilot))
        .route_layer(from_fn_with_state(state, authenticate))
}

fn validate_update(update: &PilotProfileUpdate) -> Result<(), AppError> {
    let fields = [
        ("phone", &update.phone),
        ("license_number", &update.license_number),
        ("balloon_registration", &update.balloon_registration),
        ("payout_account_id", &update.payout_account_id),
    ];
    let blank: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().is_some_and(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

    if blank.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!("{} must not be blank", blank.join(", "))))
    }
}

/// GET /api/pilot/profile
async fn get_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Pilot>, AppError> {
    state
        .store
        .get_pilot(principal.account_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))
}

/// PUT /api/pilot/profile
async fn update_profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    AppJson(update): AppJson<PilotProfileUpdate>,
) -> Result<Json<Pilot>, AppError> {
    validate_update(&update)?;
    let trimmed = PilotProfileUpdate {
        phone: update.phone.map(|v| v.trim().to_string()),
        license_number: update.license_number.map(|v| v.trim().to_string()),
        balloon_registration: update.balloon_registration.map(|v| v.trim().to_string()),
        payout_account_id: update.payout_account_id.map(|v| v.trim().to_string()),
    };

    let pilot = state
        .store
        .update_pilot_profile(principal.account_id, &trimmed)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))?;
    tracing::info!("Pilot {} updated profile", pilot.id);
    Ok(Json(pilot))
}

/// GET /api/pilot/payouts
async fn own_payouts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<PayoutSummary>>, AppError> {
    let bookings = state.store.list_bookings_by_pilot(principal.account_id).await?;
    let summaries = summarize_payouts(bookings.iter().map(|b| (principal.account_id, b)));
    Ok(Json(summaries))
}
