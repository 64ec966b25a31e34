use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use gondola_booking::CancelOutcome;
use gondola_catalog::{schedule::validate_changes, FlightDraft, FlightListing};
use gondola_core::{Flight, FlightChanges, Pilot};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::{authenticate, require_pilot, Principal};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FlightCancellationResponse {
    pub flight: Flight,
    pub canceled_bookings: Vec<CancelOutcome>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let pilot = Router::new()
        .route("/api/pilot/flights", get(list_own_flights).post(create_flight))
        .route("/api/pilot/flights/{id}", patch(update_flight))
        .route("/api/pilot/flights/{id}/cancel", post(cancel_flight))
        .route_layer(from_fn(require_pilot))
        .route_layer(from_fn_with_state(state, authenticate));

    Router::new()
        .route("/api/flights", get(list_flights))
        .route("/api/flights/{id}", get(get_flight))
        .merge(pilot)
}

/// Approved, unblocked pilot behind the session, or 403.
pub(crate) async fn active_pilot(state: &AppState, principal: &Principal) -> Result<Pilot, AppError> {
    let pilot = state
        .store
        .get_pilot(principal.account_id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))?;
    if pilot.blocked {
        return Err(AppError::AuthorizationError("Pilot account is blocked".to_string()));
    }
    if !pilot.approved {
        return Err(AppError::AuthorizationError("Pilot account is awaiting approval".to_string()));
    }
    Ok(pilot)
}

// ============================================================================
// Public Handlers
// ============================================================================

/// GET /api/flights
async fn list_flights(State(state): State<AppState>) -> Result<Json<Vec<FlightListing>>, AppError> {
    let flights = state.store.list_upcoming_flights(Utc::now()).await?;
    Ok(Json(flights.into_iter().map(FlightListing::from).collect()))
}

/// GET /api/flights/{id}
async fn get_flight(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<FlightListing>, AppError> {
    let load = state
        .store
        .get_flight(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Flight {} not found", id)))?;
    Ok(Json(load.into()))
}

// ============================================================================
// Pilot Handlers
// ============================================================================

/// GET /api/pilot/flights
async fn list_own_flights(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<FlightListing>>, AppError> {
    let flights = state.store.list_flights_by_pilot(principal.account_id).await?;
    Ok(Json(flights.into_iter().map(FlightListing::from).collect()))
}

/// POST /api/pilot/flights
async fn create_flight(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    AppJson(draft): AppJson<FlightDraft>,
) -> Result<(StatusCode, Json<Flight>), AppError> {
    let pilot = active_pilot(&state, &principal).await?;
    let new_flight = draft.into_new_flight(pilot.id, &state.default_currency, Utc::now(), &state.limits)?;

    let flight = state.store.create_flight(&new_flight).await?;
    tracing::info!("Pilot {} published flight {}", pilot.id, flight.id);
    Ok((StatusCode::CREATED, Json(flight)))
}

/// PATCH /api/pilot/flights/{id}
async fn update_flight(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    AppJson(changes): AppJson<FlightChanges>,
) -> Result<Json<Flight>, AppError> {
    let pilot = active_pilot(&state, &principal).await?;
    let not_found = || AppError::NotFoundError(format!("Flight {} not found", id));

    let current = state.store.get_flight(id).await?.ok_or_else(not_found)?;
    if current.flight.pilot_id != pilot.id {
        return Err(not_found());
    }
    validate_changes(&changes, Utc::now(), &state.limits)?;

    let flight = state.store.update_flight(id, &changes).await?.ok_or_else(not_found)?;
    tracing::info!("Pilot {} updated flight {}", pilot.id, flight.id);
    Ok(Json(flight))
}

/// POST /api/pilot/flights/{id}/cancel
async fn cancel_flight(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<FlightCancellationResponse>, AppError> {
    let (flight, canceled_bookings) = state.desk.cancel_flight(principal.account_id, id).await?;
    Ok(Json(FlightCancellationResponse {
        flight,
        canceled_bookings,
    }))
}
