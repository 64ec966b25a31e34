use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use gondola_store::redis_repo::login_rate_key;

use crate::error::AppError;
use crate::state::AppState;

/// Throttle login attempts per client IP. Fails open when Redis is missing
/// or unreachable.
pub async fn login_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match redis
        .check_rate_limit(&login_rate_key(&ip), state.auth.login_attempts_per_minute, 60)
        .await
    {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!("Login rate limit hit for {}", ip);
            Err(AppError::RateLimited)
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            Ok(next.run(req).await)
        }
    }
}
