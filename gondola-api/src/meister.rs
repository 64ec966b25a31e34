use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Extension, Json, Router,
};
use gondola_core::Pilot;
use gondola_shared::Masked;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{authenticate, require_meister, Principal};
use crate::state::AppState;

/// What an organizer sees of a pilot when planning a festival
#[derive(Debug, Serialize)]
pub struct PilotDirectoryEntry {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub license_number: String,
    pub balloon_registration: Option<String>,
}

impl From<Pilot> for PilotDirectoryEntry {
    fn from(pilot: Pilot) -> Self {
        Self {
            id: pilot.id,
            name: pilot.name,
            email: pilot.email,
            phone: pilot.phone,
            license_number: pilot.license_number,
            balloon_registration: pilot.balloon_registration,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/meister/pilots", get(pilot_directory))
        .route_layer(from_fn(require_meister))
        .route_layer(from_fn_with_state(state, authenticate))
}

/// GET /api/meister/pilots
async fn pilot_directory(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<PilotDirectoryEntry>>, AppError> {
    let meister = state
        .store
        .get_meister(principal.account_id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))?;
    if !meister.approved {
        return Err(AppError::AuthorizationError("Meister account is awaiting approval".to_string()));
    }

    let pilots = state.store.list_pilots().await?;
    Ok(Json(
        pilots
            .into_iter()
            .filter(Pilot::is_active)
            .map(PilotDirectoryEntry::from)
            .collect(),
    ))
}
