use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use gondola_core::{NewMeister, NewPassenger, NewPilot, Role, Session};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppJson};
use crate::middleware::session::{hash_session_token, new_session_token};
use crate::middleware::{authenticate, login_rate_limit, Principal};
use crate::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterPilotRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub license_number: String,
    pub balloon_registration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPassengerRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMeisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub organization: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub account_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let login = Router::new()
        .route("/api/auth/login", post(login))
        .route_layer(from_fn_with_state(state.clone(), login_rate_limit));

    let signed_in = Router::new()
        .route("/api/auth/me", get(me))
        .route_layer(from_fn_with_state(state, authenticate));

    Router::new()
        .route("/api/auth/register/pilot", post(register_pilot))
        .route("/api/auth/register/passenger", post(register_passenger))
        .route("/api/auth/register/meister", post(register_meister))
        .route("/api/auth/logout", post(logout))
        .merge(login)
        .merge(signed_in)
}

// ============================================================================
// Validation
// ============================================================================

struct AccountFields<'a> {
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    password: &'a str,
}

fn validate_account(fields: &AccountFields<'_>, extra: &[(&str, &str)]) -> Result<(), AppError> {
    let mut problems = Vec::new();
    if fields.name.trim().is_empty() {
        problems.push("name must not be empty".to_string());
    }
    let email = fields.email.trim();
    if email.len() < 3 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        problems.push("email is not a valid address".to_string());
    }
    if fields.phone.trim().is_empty() {
        problems.push("phone must not be empty".to_string());
    }
    if fields.password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!("password must be at least {} characters", MIN_PASSWORD_LEN));
    }
    for (field, value) in extra {
        if value.trim().is_empty() {
            problems.push(format!("{} must not be empty", field));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(problems.join("; ")))
    }
}

// ============================================================================
// Registration Handlers
// ============================================================================

/// POST /api/auth/register/pilot
async fn register_pilot(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterPilotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_account(
        &AccountFields {
            name: &req.name,
            email: &req.email,
            phone: &req.phone,
            password: &req.password,
        },
        &[("license_number", &req.license_number)],
    )?;

    let pilot = state
        .store
        .create_pilot(&NewPilot {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            password_hash: hash_password(&req.password).await?,
            license_number: req.license_number.trim().to_string(),
            balloon_registration: req.balloon_registration.filter(|r| !r.trim().is_empty()),
        })
        .await?;

    tracing::info!("Pilot {} registered, awaiting approval", pilot.id);
    Ok((StatusCode::CREATED, Json(json!(pilot))))
}

/// POST /api/auth/register/passenger
async fn register_passenger(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterPassengerRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_account(
        &AccountFields {
            name: &req.name,
            email: &req.email,
            phone: &req.phone,
            password: &req.password,
        },
        &[],
    )?;

    let passenger = state
        .store
        .create_passenger(&NewPassenger {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            password_hash: hash_password(&req.password).await?,
        })
        .await?;

    tracing::info!("Passenger {} registered", passenger.id);
    Ok((StatusCode::CREATED, Json(json!(passenger))))
}

/// POST /api/auth/register/meister
async fn register_meister(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterMeisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    validate_account(
        &AccountFields {
            name: &req.name,
            email: &req.email,
            phone: &req.phone,
            password: &req.password,
        },
        &[("organization", &req.organization)],
    )?;

    let meister = state
        .store
        .create_meister(&NewMeister {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            organization: req.organization.trim().to_string(),
            password_hash: hash_password(&req.password).await?,
        })
        .await?;

    tracing::info!("Meister {} registered, awaiting approval", meister.id);
    Ok((StatusCode::CREATED, Json(json!(meister))))
}

// ============================================================================
// Session Handlers
// ============================================================================

struct Credentials {
    account_id: Uuid,
    password_hash: String,
    blocked: bool,
}

async fn find_credentials(state: &AppState, role: Role, email: &str) -> Result<Option<Credentials>, AppError> {
    let credentials = match role {
        Role::Pilot => state.store.find_pilot_by_email(email).await?.map(|p| Credentials {
            account_id: p.id,
            password_hash: p.password_hash,
            blocked: p.blocked,
        }),
        Role::Passenger => state.store.find_passenger_by_email(email).await?.map(|p| Credentials {
            account_id: p.id,
            password_hash: p.password_hash,
            blocked: false,
        }),
        Role::Meister => state.store.find_meister_by_email(email).await?.map(|m| Credentials {
            account_id: m.id,
            password_hash: m.password_hash,
            blocked: false,
        }),
        Role::Admin => state.store.find_admin_by_email(email).await?.map(|a| Credentials {
            account_id: a.id,
            password_hash: a.password_hash,
            blocked: false,
        }),
    };
    Ok(credentials)
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let invalid = || AppError::AuthenticationError("Invalid email or password".to_string());

    let credentials = find_credentials(&state, req.role, req.email.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &credentials.password_hash).await {
        return Err(invalid());
    }
    if credentials.blocked {
        return Err(AppError::AuthorizationError("Account is blocked".to_string()));
    }

    let token = new_session_token();
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4(),
        token_hash: hash_session_token(&token),
        account_id: credentials.account_id,
        role: req.role,
        created_at: now,
        expires_at: now + state.auth.session_ttl,
    };
    state.store.create_session(&session).await?;
    tracing::info!("{} {} signed in", req.role, credentials.account_id);

    let cookie = Cookie::build((state.auth.cookie_name.clone(), token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.auth.secure_cookie)
        .path("/");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            account_id: session.account_id,
            role: session.role,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, StatusCode), AppError> {
    if let Some(token) = jar.get(&state.auth.cookie_name).map(|c| c.value().to_string()) {
        if let Some(session) = state.store.find_session(&hash_session_token(&token), Utc::now()).await? {
            state.store.delete_session(session.id).await?;
        }
    }

    let jar = jar.remove(Cookie::build((state.auth.cookie_name.clone(), "")).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// GET /api/auth/me
async fn me(State(state): State<AppState>, Extension(principal): Extension<Principal>) -> Result<Json<Value>, AppError> {
    let id = principal.account_id;
    let account = match principal.role {
        Role::Pilot => state.store.get_pilot(id).await?.map(|a| json!(a)),
        Role::Passenger => state.store.get_passenger(id).await?.map(|a| json!(a)),
        Role::Meister => state.store.get_meister(id).await?.map(|a| json!(a)),
        Role::Admin => state.store.get_admin(id).await?.map(|a| json!(a)),
    }
    .ok_or_else(|| AppError::AuthenticationError("Account no longer exists".to_string()))?;

    Ok(Json(json!({
        "role": principal.role,
        "account": account,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_validation_collects_every_problem() {
        let err = validate_account(
            &AccountFields {
                name: " ",
                email: "nobody",
                phone: "",
                password: "short",
            },
            &[("organization", "")],
        )
        .unwrap_err();

        let AppError::ValidationError(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("name"));
        assert!(msg.contains("email"));
        assert!(msg.contains("phone"));
        assert!(msg.contains("password"));
        assert!(msg.contains("organization"));
    }
}
