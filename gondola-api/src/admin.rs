use axum::{
    extract::{Path, State},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use gondola_booking::finance::summarize_payouts;
use gondola_booking::{CancelActor, CancelOutcome, PayoutSummary};
use gondola_core::{Booking, Meister, Pilot, PlatformSettings};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::{authenticate, require_admin};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub fee_bps: u32,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/pilots", get(list_pilots))
        .route("/api/admin/pilots/{id}/approve", post(approve_pilot))
        .route("/api/admin/pilots/{id}/block", post(block_pilot))
        .route("/api/admin/pilots/{id}/unblock", post(unblock_pilot))
        .route("/api/admin/meisters", get(list_meisters))
        .route("/api/admin/meisters/{id}/approve", post(approve_meister))
        .route("/api/admin/bookings", get(list_bookings))
        .route("/api/admin/bookings/{id}/cancel", post(cancel_booking))
        .route("/api/admin/settings", get(get_settings).put(update_settings))
        .route("/api/admin/payouts", get(payouts))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state, authenticate))
}

fn pilot_not_found(id: Uuid) -> AppError {
    AppError::NotFoundError(format!("Pilot {} not found", id))
}

// ============================================================================
// Pilot Management Handlers
// ============================================================================

/// GET /api/admin/pilots
async fn list_pilots(State(state): State<AppState>) -> Result<Json<Vec<Pilot>>, AppError> {
    Ok(Json(state.store.list_pilots().await?))
}

/// POST /api/admin/pilots/{id}/approve
async fn approve_pilot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Pilot>, AppError> {
    let pilot = state
        .store
        .set_pilot_approved(id, true)
        .await?
        .ok_or_else(|| pilot_not_found(id))?;
    tracing::info!("Pilot {} approved", id);
    Ok(Json(pilot))
}

/// POST /api/admin/pilots/{id}/block
async fn block_pilot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Pilot>, AppError> {
    let pilot = state
        .store
        .set_pilot_blocked(id, true)
        .await?
        .ok_or_else(|| pilot_not_found(id))?;
    let revoked = state.store.delete_sessions_for_account(id).await?;
    tracing::info!("Pilot {} blocked, {} sessions revoked", id, revoked);
    Ok(Json(pilot))
}

/// POST /api/admin/pilots/{id}/unblock
async fn unblock_pilot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Pilot>, AppError> {
    let pilot = state
        .store
        .set_pilot_blocked(id, false)
        .await?
        .ok_or_else(|| pilot_not_found(id))?;
    tracing::info!("Pilot {} unblocked", id);
    Ok(Json(pilot))
}

// ============================================================================
// Meister Management Handlers
// ============================================================================

/// GET /api/admin/meisters
async fn list_meisters(State(state): State<AppState>) -> Result<Json<Vec<Meister>>, AppError> {
    Ok(Json(state.store.list_meisters().await?))
}

/// POST /api/admin/meisters/{id}/approve
async fn approve_meister(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Meister>, AppError> {
    let meister = state
        .store
        .set_meister_approved(id, true)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Meister {} not found", id)))?;
    tracing::info!("Meister {} approved", id);
    Ok(Json(meister))
}

// ============================================================================
// Booking Oversight Handlers
// ============================================================================

/// GET /api/admin/bookings
async fn list_bookings(State(state): State<AppState>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.store.list_all_bookings().await?))
}

/// POST /api/admin/bookings/{id}/cancel
async fn cancel_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.desk.cancel(id, CancelActor::Admin).await?))
}

/// GET /api/admin/payouts
async fn payouts(State(state): State<AppState>) -> Result<Json<Vec<PayoutSummary>>, AppError> {
    let bookings = state.store.list_bookings_with_pilot().await?;
    let summaries = summarize_payouts(bookings.iter().map(|(pilot_id, booking)| (*pilot_id, booking)));
    Ok(Json(summaries))
}

// ============================================================================
// Platform Settings Handlers
// ============================================================================

/// GET /api/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<PlatformSettings>, AppError> {
    Ok(Json(state.desk.settings().await?))
}

/// PUT /api/admin/settings
async fn update_settings(
    State(state): State<AppState>,
    AppJson(req): AppJson<UpdateSettingsRequest>,
) -> Result<Json<PlatformSettings>, AppError> {
    let settings = PlatformSettings::new(req.fee_bps)?;
    let saved = state.store.save_settings(&settings).await?;
    tracing::info!("Platform fee set to {} bps", saved.fee_bps);
    Ok(Json(saved))
}
