use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use gondola_core::Role;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Session tokens
// ============================================================================

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub account_id: Uuid,
    pub role: Role,
    pub session_id: Uuid,
}

/// 32 random bytes, base64url without padding. Only ever sent in the cookie.
pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// What the store keeps instead of the token itself.
pub fn hash_session_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ============================================================================
// Session Middleware
// ============================================================================

pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(req.headers());
    let token = jar
        .get(&state.auth.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::AuthenticationError("Not signed in".to_string()))?;

    let session = state
        .store
        .find_session(&hash_session_token(&token), Utc::now())
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Session expired or invalid".to_string()))?;

    req.extensions_mut().insert(Principal {
        account_id: session.account_id,
        role: session.role,
        session_id: session.id,
    });

    Ok(next.run(req).await)
}

// ============================================================================
// Role guards, layered inside `authenticate`
// ============================================================================

async fn require_role(role: Role, req: Request, next: Next) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AppError::AuthenticationError("Not signed in".to_string()))?;

    if principal.role != role {
        return Err(AppError::AuthorizationError(format!("This action requires the {} role", role)));
    }

    Ok(next.run(req).await)
}

pub async fn require_pilot(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Pilot, req, next).await
}

pub async fn require_passenger(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Passenger, req, next).await
}

pub async fn require_meister(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Meister, req, next).await
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Admin, req, next).await
}
