use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Extension, Json, Router,
};
use gondola_booking::{CancelActor, CancelOutcome, ReservedBooking};
use gondola_core::Booking;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::{authenticate, require_passenger, require_pilot, Principal};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub flight_id: Uuid,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let passenger = Router::new()
        .route("/api/bookings", get(list_own_bookings).post(create_booking))
        .route("/api/bookings/{id}", get(get_own_booking))
        .route("/api/bookings/{id}/cancel", post(cancel_own_booking))
        .route_layer(from_fn(require_passenger))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let pilot = Router::new()
        .route("/api/pilot/bookings", get(list_pilot_bookings))
        .route("/api/pilot/bookings/{id}/cancel", post(cancel_pilot_booking))
        .route_layer(from_fn(require_pilot))
        .route_layer(from_fn_with_state(state, authenticate));

    Router::new().merge(passenger).merge(pilot)
}

// ============================================================================
// Passenger Handlers
// ============================================================================

/// POST /api/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ReservedBooking>), AppError> {
    let passenger = state
        .store
        .get_passenger(principal.account_id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))?;

    let reserved = state.desk.reserve(&passenger, req.flight_id).await?;
    Ok((StatusCode::CREATED, Json(reserved)))
}

/// GET /api/bookings
async fn list_own_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.store.list_bookings_by_passenger(principal.account_id).await?))
}

/// GET /api/bookings/{id}
async fn get_own_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    state
        .store
        .get_booking(id)
        .await?
        .filter(|b| b.passenger_id == principal.account_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))
}

/// POST /api/bookings/{id}/cancel
async fn cancel_own_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    let outcome = state.desk.cancel(id, CancelActor::Passenger(principal.account_id)).await?;
    Ok(Json(outcome))
}

// ============================================================================
// Pilot Handlers
// ============================================================================

/// GET /api/pilot/bookings
async fn list_pilot_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.store.list_bookings_by_pilot(principal.account_id).await?))
}

/// POST /api/pilot/bookings/{id}/cancel
async fn cancel_pilot_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    let outcome = state.desk.cancel(id, CancelActor::Pilot(principal.account_id)).await?;
    Ok(Json(outcome))
}
